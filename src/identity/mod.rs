//! Session identity: what a session is, how it is sealed into a token, when it expires,
//! and how one is obtained from credentials.

mod session;
mod codec;
mod policy;
mod provider;
mod authorizer;

pub use session::{Session, RESERVED_FIELDS};
pub use codec::{CodecError, SessionCodec};
pub use policy::{is_well_formed, Clock, ManualClock, SessionPolicy, SystemClock};
pub use provider::{AuthProvider, LocalAuthProvider, LoginRequest, LoginResponse};
pub use authorizer::{check_access, require_subject};
