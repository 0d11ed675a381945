pub mod auth_input;
pub mod category;
pub mod dashboard;
pub mod document;
pub mod hospital;
pub mod patient;
pub mod user;

pub use auth_input::{
    AccessTokenResponse, AuthMessageResponse, CreateDoctorInput, LoginInput, MessageResponse,
    RefreshInput, RegisterInput, TokenPairResponse, VerifyOtpInput,
};
pub use category::{
    Category, CategoryRow, CreateCategoryInput, Field, FieldInput, FieldType, UpdateCategoryInput,
};
pub use dashboard::{CategoryStat, DashboardTotals, HospitalStat};
pub use document::{
    CreateDocumentInput, CreateDocumentResponse, DocumentQuery, DocumentRow, DocumentView,
    VerifyDocumentResponse,
};
pub use hospital::{Doctor, Hospital, HospitalInput};
pub use patient::{Patient, PatientInput, PatientQuery};
pub use user::{Role, User, UserProfile};
