pub mod machine;
pub mod types;

pub use machine::{Branch, LoginMachine, Stage, Transition, detect_branch, login_failure_text};
pub use types::{Credentials, LoginError, LoginResult, LoginState};
