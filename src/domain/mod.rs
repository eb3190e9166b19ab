pub mod entities;
pub mod money;
pub mod normalize;
pub mod scholarship;

pub use entities::{Campus, Initiative, Organization, Person, ScholarshipType};
pub use money::{Money, MoneyError};
pub use scholarship::{
    DomainError, Scholarship, ScholarshipDraft, ScholarshipError, ValidationErrors,
};
