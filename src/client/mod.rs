//! Typed HTTP client for the records API.
//!
//! Every authenticated call carries the stored access token. A 401 triggers a
//! single refresh and one retry; when that fails the session is cleared and
//! [`ClientError::SessionExpired`] tells the caller to return to login.

pub mod error;
pub mod otp;
pub mod session;

use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub use error::{ClientError, ClientResult};
pub use otp::{OtpGate, ResendCountdown, RESEND_COOLDOWN_SECS};
pub use session::{FileSessionStore, MemorySessionStore, Session, SessionStore};

use crate::models::{
    AccessTokenResponse, AuthMessageResponse, Category, CategoryStat, CreateCategoryInput,
    CreateDoctorInput, CreateDocumentInput, CreateDocumentResponse, DashboardTotals, Doctor,
    DocumentView, Field, FieldInput, Hospital, HospitalInput, HospitalStat, LoginInput,
    MessageResponse, Patient, PatientInput, RegisterInput, TokenPairResponse, UpdateCategoryInput,
    UserProfile, VerifyDocumentResponse, VerifyOtpInput,
};
use crate::validation::{self, FieldError};

pub struct RecordsClient<S: SessionStore> {
    http: reqwest::Client,
    base_url: Url,
    store: Arc<S>,
}

impl<S: SessionStore> Clone for RecordsClient<S> {
    fn clone(&self) -> Self {
        Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            store: self.store.clone(),
        }
    }
}

impl<S: SessionStore + 'static> RecordsClient<S> {
    pub fn new(base_url: &str, store: S) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Self::with_http(http, base_url, store)
    }

    pub fn with_http(http: reqwest::Client, base_url: &str, store: S) -> ClientResult<Self> {
        // Joining relative paths needs a trailing slash on the base.
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url = Url::parse(&normalized).map_err(|e| ClientError::Api {
            status: 0,
            message: format!("Invalid base URL {}: {}", base_url, e),
        })?;

        Ok(Self {
            http,
            base_url,
            store: Arc::new(store),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn is_authenticated(&self) -> ClientResult<bool> {
        Ok(self.store.load()?.is_some())
    }

    pub fn logout(&self) -> ClientResult<()> {
        self.store.clear()
    }

    fn url(&self, path: &str) -> ClientResult<Url> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::Api {
                status: 0,
                message: format!("Invalid path {}: {}", path, e),
            })
    }

    fn request(&self, method: Method, path: &str) -> ClientResult<RequestBuilder> {
        Ok(self.http.request(method, self.url(path)?))
    }

    /// Turn a non-success response into a [`ClientError`].
    async fn check(response: Response) -> ClientResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);

        if status == StatusCode::UNPROCESSABLE_ENTITY {
            if let Some(fields) = body
                .get("fields")
                .and_then(|f| serde_json::from_value::<Vec<FieldError>>(f.clone()).ok())
            {
                return Err(ClientError::Validation(fields));
            }
        }

        let message = body
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("Request failed").to_string());

        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
        Ok(Self::check(response).await?.json().await?)
    }

    /// POST the refresh token and return a new access token.
    async fn request_access_token(&self, refresh: &str) -> ClientResult<String> {
        let response = self
            .request(Method::POST, "api/auth/token/refresh/")?
            .json(&json!({ "refresh": refresh }))
            .send()
            .await?;
        let body: AccessTokenResponse = Self::decode(response).await?;
        Ok(body.access)
    }

    fn expire(&self) -> ClientError {
        if let Err(e) = self.store.clear() {
            tracing::warn!(error = %e, "Failed to clear expired session");
        }
        ClientError::SessionExpired
    }

    /// Send an authenticated request built by `build`, refreshing at most once.
    async fn send_authorized<F>(&self, build: F) -> ClientResult<Response>
    where
        F: Fn() -> ClientResult<RequestBuilder>,
    {
        let session = self.store.load()?.ok_or(ClientError::NotAuthenticated)?;

        let response = build()?.bearer_auth(&session.access).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        let Some(refresh) = session.refresh.as_deref() else {
            tracing::debug!("Access token rejected and no refresh token stored");
            return Err(self.expire());
        };

        let access = match self.request_access_token(refresh).await {
            Ok(access) => access,
            Err(e) => {
                tracing::debug!(error = %e, "Token refresh failed");
                return Err(self.expire());
            }
        };

        let renewed = Session {
            access,
            ..session
        };
        self.store.save(&renewed)?;

        let retried = build()?.bearer_auth(&renewed.access).send().await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            return Err(self.expire());
        }
        Ok(retried)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        let response = self.send_authorized(|| self.request(Method::GET, path)).await?;
        Self::decode(response).await
    }

    async fn get_json_query<T, Q>(&self, path: &str, query: &Q) -> ClientResult<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let response = self
            .send_authorized(|| Ok(self.request(Method::GET, path)?.query(query)))
            .await?;
        Self::decode(response).await
    }

    async fn send_json<T, B>(&self, method: Method, path: &str, body: &B) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self
            .send_authorized(|| Ok(self.request(method.clone(), path)?.json(body)))
            .await?;
        Self::decode(response).await
    }

    async fn delete(&self, path: &str) -> ClientResult<()> {
        let response = self.send_authorized(|| self.request(Method::DELETE, path)).await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn post_public<T, B>(&self, path: &str, body: &B) -> ClientResult<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self.request(Method::POST, path)?.json(body).send().await?;
        Self::decode(response).await
    }

    /// Refresh the access token now. Clears the session if the server refuses.
    pub async fn refresh_session(&self) -> ClientResult<()> {
        let session = self.store.load()?.ok_or(ClientError::NotAuthenticated)?;
        let Some(refresh) = session.refresh.as_deref() else {
            return Err(self.expire());
        };

        match self.request_access_token(refresh).await {
            Ok(access) => self.store.save(&Session { access, ..session }),
            Err(ClientError::Api { status, .. }) if status == StatusCode::UNAUTHORIZED.as_u16() => {
                Err(self.expire())
            }
            Err(e) => Err(e),
        }
    }

    /// Periodically refresh the access token while a session exists.
    ///
    /// Stops once the session is gone or has expired.
    pub fn spawn_proactive_refresh(&self, every: Duration) -> JoinHandle<()> {
        let client = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match client.refresh_session().await {
                    Ok(()) => tracing::debug!("Access token refreshed"),
                    Err(ClientError::NotAuthenticated) | Err(ClientError::SessionExpired) => {
                        tracing::info!("Proactive refresh stopped: no active session");
                        break;
                    }
                    Err(e) => tracing::warn!(error = %e, "Proactive refresh failed"),
                }
            }
        })
    }

    // ---- auth ----

    pub async fn register(&self, input: &RegisterInput) -> ClientResult<AuthMessageResponse> {
        let mut errors = Vec::new();
        if let Err(e) = validation::validate_email(&input.email) {
            errors.push(e);
        }
        if let Err(e) = validation::validate_name("username", &input.username, 50) {
            errors.push(e);
        }
        if let Err(password_errors) =
            validation::validate_registration(&input.password, &input.confirm_password)
        {
            errors.extend(password_errors);
        }
        if !errors.is_empty() {
            return Err(ClientError::Validation(errors));
        }

        self.post_public("api/auth/register/", input).await
    }

    /// Password step of the login; the server mails a one-time code.
    pub async fn login(&self, email: &str, password: &str) -> ClientResult<OtpGate<'_, S>> {
        validation::validate_email(email).map_err(|e| ClientError::Validation(vec![e]))?;
        if password.is_empty() {
            return Err(ClientError::Validation(vec![FieldError::new(
                "password",
                "Password is required",
            )]));
        }

        let input = LoginInput {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response: AuthMessageResponse = self.post_public("api/auth/login/", &input).await?;
        Ok(OtpGate::new(self, response.email))
    }

    pub(crate) async fn verify_otp(&self, input: &VerifyOtpInput) -> ClientResult<TokenPairResponse> {
        self.post_public("api/auth/verify-otp/", input).await
    }

    pub async fn me(&self) -> ClientResult<UserProfile> {
        self.get_json("api/auth/me/").await
    }

    pub async fn create_doctor(&self, email: &str, hospital: i64) -> ClientResult<MessageResponse> {
        let input = CreateDoctorInput {
            email: email.to_string(),
            hospital,
        };
        self.send_json(Method::POST, "api/auth/create-doctor/", &input).await
    }

    // ---- patients ----

    pub async fn list_patients(
        &self,
        search: Option<&str>,
        sex: Option<&str>,
    ) -> ClientResult<Vec<Patient>> {
        let mut query = Vec::new();
        if let Some(search) = search {
            query.push(("search", search));
        }
        if let Some(sex) = sex {
            query.push(("sex", sex));
        }
        self.get_json_query("api/auth/patients/", &query).await
    }

    pub async fn get_patient(&self, id: i64) -> ClientResult<Patient> {
        self.get_json(&format!("api/auth/patients/{}/", id)).await
    }

    /// Validates locally before sending.
    pub async fn create_patient(&self, input: &PatientInput) -> ClientResult<Patient> {
        input
            .validate(chrono::Utc::now().date_naive())
            .map_err(ClientError::Validation)?;
        self.send_json(Method::POST, "api/auth/patients/", input).await
    }

    pub async fn update_patient(&self, id: i64, input: &PatientInput) -> ClientResult<Patient> {
        input
            .validate(chrono::Utc::now().date_naive())
            .map_err(ClientError::Validation)?;
        self.send_json(Method::PUT, &format!("api/auth/patients/{}/", id), input)
            .await
    }

    pub async fn delete_patient(&self, id: i64) -> ClientResult<()> {
        self.delete(&format!("api/auth/patients/{}/", id)).await
    }

    // ---- categories ----

    pub async fn list_categories(&self) -> ClientResult<Vec<Category>> {
        self.get_json("api/category/").await
    }

    pub async fn get_category(&self, id: i64) -> ClientResult<Category> {
        self.get_json(&format!("api/category/{}/", id)).await
    }

    pub async fn create_category(&self, input: &CreateCategoryInput) -> ClientResult<Category> {
        self.send_json(Method::POST, "api/category/", input).await
    }

    pub async fn rename_category(&self, id: i64, name: &str) -> ClientResult<Category> {
        let input = UpdateCategoryInput {
            name: name.to_string(),
        };
        self.send_json(Method::PUT, &format!("api/category/{}/", id), &input)
            .await
    }

    pub async fn delete_category(&self, id: i64) -> ClientResult<()> {
        self.delete(&format!("api/category/{}/", id)).await
    }

    pub async fn list_fields(&self, category_id: i64) -> ClientResult<Vec<Field>> {
        self.get_json(&format!("api/category/{}/fields/", category_id))
            .await
    }

    pub async fn create_field(&self, category_id: i64, input: &FieldInput) -> ClientResult<Field> {
        self.send_json(
            Method::POST,
            &format!("api/category/{}/fields/", category_id),
            input,
        )
        .await
    }

    pub async fn delete_field(&self, category_id: i64, field_id: i64) -> ClientResult<()> {
        self.delete(&format!("api/category/{}/fields/{}/", category_id, field_id))
            .await
    }

    // ---- hospitals ----

    pub async fn list_hospitals(&self) -> ClientResult<Vec<Hospital>> {
        self.get_json("api/hospital/").await
    }

    pub async fn get_hospital(&self, id: i64) -> ClientResult<Hospital> {
        self.get_json(&format!("api/hospital/{}/", id)).await
    }

    pub async fn create_hospital(&self, name: &str) -> ClientResult<Hospital> {
        let input = HospitalInput {
            name: name.to_string(),
        };
        self.send_json(Method::POST, "api/hospital/", &input).await
    }

    pub async fn update_hospital(&self, id: i64, name: &str) -> ClientResult<Hospital> {
        let input = HospitalInput {
            name: name.to_string(),
        };
        self.send_json(Method::PUT, &format!("api/hospital/{}/", id), &input)
            .await
    }

    pub async fn delete_hospital(&self, id: i64) -> ClientResult<()> {
        self.delete(&format!("api/hospital/{}/", id)).await
    }

    pub async fn list_doctors(&self, hospital_id: i64) -> ClientResult<Vec<Doctor>> {
        self.get_json(&format!("api/hospital/{}/doctors/", hospital_id))
            .await
    }

    // ---- documents ----

    pub async fn create_document(
        &self,
        input: &CreateDocumentInput,
    ) -> ClientResult<CreateDocumentResponse> {
        self.send_json(Method::POST, "api/documents/create/", input)
            .await
    }

    pub async fn get_document(&self, id: i64) -> ClientResult<DocumentView> {
        self.get_json(&format!("api/documents/{}/", id)).await
    }

    pub async fn last_document(
        &self,
        patient_id: i64,
        category_id: i64,
    ) -> ClientResult<DocumentView> {
        self.get_json_query(
            "api/documents/last/",
            &[("patient_id", patient_id), ("category_id", category_id)],
        )
        .await
    }

    pub async fn document_history(
        &self,
        patient_id: i64,
        category_id: i64,
    ) -> ClientResult<Vec<DocumentView>> {
        self.get_json_query(
            "api/documents/history/",
            &[("patient_id", patient_id), ("category_id", category_id)],
        )
        .await
    }

    pub async fn verify_document(&self, id: i64) -> ClientResult<VerifyDocumentResponse> {
        self.get_json(&format!("api/documents/verify/{}/", id)).await
    }

    // ---- dashboard ----

    pub async fn dashboard(&self) -> ClientResult<DashboardTotals> {
        self.get_json("api/admin-dashboard/").await
    }

    pub async fn hospital_stats(&self) -> ClientResult<Vec<HospitalStat>> {
        self.get_json("api/hospitals/stats/").await
    }

    pub async fn category_stats(&self) -> ClientResult<Vec<CategoryStat>> {
        self.get_json("api/categories/stats/").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session(access: &str, refresh: Option<&str>) -> Session {
        Session {
            access: access.to_string(),
            refresh: refresh.map(str::to_string),
            role: None,
            user_id: Some(1),
        }
    }

    fn client(server: &MockServer, session: Option<Session>) -> RecordsClient<MemorySessionStore> {
        let store = match session {
            Some(s) => MemorySessionStore::with_session(s),
            None => MemorySessionStore::new(),
        };
        RecordsClient::new(&server.uri(), store).unwrap()
    }

    #[tokio::test]
    async fn test_attaches_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/hospital/"))
            .and(header("Authorization", "Bearer good"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1, "name": "CHN" }])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, Some(session("good", Some("r"))));
        let hospitals = client.list_hospitals().await.unwrap();
        assert_eq!(hospitals, vec![Hospital { id: 1, name: "CHN".to_string() }]);
    }

    #[tokio::test]
    async fn test_expired_token_refreshes_once_then_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/hospital/"))
            .and(header("Authorization", "Bearer stale"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "expired" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/token/refresh/"))
            .and(body_json(json!({ "refresh": "r1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": "fresh" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/hospital/"))
            .and(header("Authorization", "Bearer fresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, Some(session("stale", Some("r1"))));
        assert!(client.list_hospitals().await.unwrap().is_empty());

        let stored = client.store().load().unwrap().unwrap();
        assert_eq!(stored.access, "fresh");
        assert_eq!(stored.refresh.as_deref(), Some("r1"));
    }

    #[tokio::test]
    async fn test_failed_refresh_logs_out_after_single_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/category/"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/token/refresh/"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "Token is invalid or expired" })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, Some(session("stale", Some("dead"))));
        let err = client.list_categories().await.unwrap_err();

        assert!(matches!(err, ClientError::SessionExpired));
        assert_eq!(client.store().load().unwrap(), None);
    }

    #[tokio::test]
    async fn test_retry_rejected_again_logs_out_without_second_refresh() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/auth/me/"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/token/refresh/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": "still-bad" })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server, Some(session("stale", Some("r"))));
        assert!(matches!(client.me().await, Err(ClientError::SessionExpired)));
        assert_eq!(client.store().load().unwrap(), None);
    }

    #[tokio::test]
    async fn test_no_refresh_token_clears_session_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/hospital/"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/token/refresh/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": "x" })))
            .expect(0)
            .mount(&server)
            .await;

        let client = client(&server, Some(session("stale", None)));
        assert!(matches!(client.list_hospitals().await, Err(ClientError::SessionExpired)));
        assert_eq!(client.store().load().unwrap(), None);
    }

    #[tokio::test]
    async fn test_without_session_request_is_not_sent() {
        let server = MockServer::start().await;
        let client = client(&server, None);
        assert!(matches!(client.dashboard().await, Err(ClientError::NotAuthenticated)));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_error_statuses_map_to_api_and_validation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/documents/verify/9/"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({ "error": "Hashes do not match: Data may be corrupted." })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/documents/create/"))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({
                "error": "Validation failed",
                "fields": [{ "field": "result.glucose", "message": "glucose is required." }]
            })))
            .mount(&server)
            .await;

        let client = client(&server, Some(session("good", Some("r"))));

        match client.verify_document(9).await {
            Err(ClientError::Api { status, message }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "Hashes do not match: Data may be corrupted.");
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let input = CreateDocumentInput {
            patient_id: 1,
            category_id: 2,
            result: Default::default(),
        };
        match client.create_document(&input).await {
            Err(ClientError::Validation(fields)) => {
                assert_eq!(fields, vec![FieldError::new("result.glucose", "glucose is required.")]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_patient_is_rejected_before_sending() {
        let server = MockServer::start().await;
        let client = client(&server, Some(session("good", Some("r"))));

        let input = PatientInput {
            identity_number: "123".to_string(),
            last_name: "Ould".to_string(),
            first_name: "Sidi".to_string(),
            birth_date: chrono::NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
            sex: "M".to_string(),
            phone_number: "22334455".to_string(),
        };

        assert!(matches!(
            client.create_patient(&input).await,
            Err(ClientError::Validation(_))
        ));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }
}
