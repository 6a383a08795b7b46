//! Library user accounts

pub mod models;
pub mod validation;

pub use models::{
    Actor, NewUser, Role, User, UserActivityCounts, UserCredentials, UserQuery, UserRef, UserSortField,
    UserSummary,
};
pub use validation::{DisplayName, EmailAddress, ValidationError, check_password};
