use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::models::{
    AccessTokenResponse, AuthMessageResponse, Category, CategoryStat, CreateCategoryInput,
    CreateDoctorInput, CreateDocumentInput, CreateDocumentResponse, DashboardTotals, Doctor,
    DocumentView, Field, FieldInput, FieldType, Hospital, HospitalInput, HospitalStat, LoginInput,
    MessageResponse, Patient, PatientInput, RefreshInput, RegisterInput, Role, TokenPairResponse,
    UpdateCategoryInput, UserProfile, VerifyDocumentResponse, VerifyOtpInput,
};
use crate::validation::FieldError;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Medical Records API",
        version = "1.0.0",
        description = "Patients, hospitals, dynamic document categories and encrypted medical documents"
    ),
    servers(
        (url = "http://localhost:8000", description = "Local development server"),
    ),
    paths(
        // Health
        crate::handlers::health::health_check,
        crate::handlers::metrics::metrics_handler,

        // Auth
        crate::handlers::auth_handler::register,
        crate::handlers::auth_handler::login,
        crate::handlers::auth_handler::verify_otp,
        crate::handlers::auth_handler::refresh_token,
        crate::handlers::auth_handler::get_me,
        crate::handlers::auth_handler::create_doctor,

        // Patients
        crate::handlers::patients_handler::list_patients,
        crate::handlers::patients_handler::create_patient,
        crate::handlers::patients_handler::get_patient,
        crate::handlers::patients_handler::update_patient,
        crate::handlers::patients_handler::delete_patient,

        // Categories
        crate::handlers::categories_handler::list_categories,
        crate::handlers::categories_handler::create_category,
        crate::handlers::categories_handler::get_category,
        crate::handlers::categories_handler::update_category,
        crate::handlers::categories_handler::delete_category,
        crate::handlers::categories_handler::list_fields,
        crate::handlers::categories_handler::create_field,
        crate::handlers::categories_handler::delete_field,

        // Hospitals
        crate::handlers::hospitals_handler::list_hospitals,
        crate::handlers::hospitals_handler::create_hospital,
        crate::handlers::hospitals_handler::get_hospital,
        crate::handlers::hospitals_handler::update_hospital,
        crate::handlers::hospitals_handler::delete_hospital,
        crate::handlers::hospitals_handler::list_doctors,

        // Documents
        crate::handlers::documents_handler::create_document,
        crate::handlers::documents_handler::get_document,
        crate::handlers::documents_handler::last_document,
        crate::handlers::documents_handler::document_history,
        crate::handlers::documents_handler::verify_document,

        // Dashboard
        crate::handlers::dashboard_handler::admin_dashboard,
        crate::handlers::dashboard_handler::hospital_stats,
        crate::handlers::dashboard_handler::category_stats,
    ),
    components(
        schemas(
            Patient, PatientInput,
            Category, Field, FieldType, FieldInput, CreateCategoryInput, UpdateCategoryInput,
            Hospital, HospitalInput, Doctor,
            DocumentView, CreateDocumentInput, CreateDocumentResponse, VerifyDocumentResponse,
            DashboardTotals, HospitalStat, CategoryStat,

            // Auth types
            Role, UserProfile, RegisterInput, LoginInput, VerifyOtpInput, RefreshInput,
            CreateDoctorInput, AuthMessageResponse, TokenPairResponse, AccessTokenResponse,
            MessageResponse, FieldError,
        )
    ),
    tags(
        (name = "health", description = "Health check and metrics"),
        (name = "auth", description = "Registration, OTP login and tokens"),
        (name = "patients", description = "Patient records"),
        (name = "categories", description = "Document categories and their field schemas"),
        (name = "hospitals", description = "Hospitals and their doctors"),
        (name = "documents", description = "Encrypted medical documents"),
        (name = "dashboard", description = "Admin statistics"),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_document_paths_and_bearer_scheme() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/api/documents/create/"));
        assert!(doc.paths.paths.contains_key("/api/category/{id}/fields/{field_id}/"));

        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
