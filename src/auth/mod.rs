mod login;
mod session;

pub use login::{Authenticator, LOGIN_PATH};
pub use session::{AuthSession, Credential};
