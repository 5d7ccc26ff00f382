//! `orgiam-identity`: user identity: credential value objects, the `User`
//! entity with its lockout machine, and the `UserAggregate`.

pub mod auth_token;
pub mod email;
pub mod password;
pub mod user;
pub mod user_aggregate;
pub mod username;

pub use auth_token::{AuthToken, TokenType};
pub use email::Email;
pub use password::{Password, PasswordStrength};
pub use user::{LoginOutcome, User, UserStatus};
pub use user_aggregate::{
    UserAggregate, UserEvent, UserLimits, UserSettings, UserSettingsPatch, UserStatistics,
    UserStatisticsUpdate,
};
pub use username::Username;
