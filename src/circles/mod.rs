//! Circles: user-created fan groups with owner/admin/member roles.

mod error;
mod routes;
mod service;
mod store;
mod types;

pub use error::CircleError;
pub use routes::CircleModule;
pub use service::CircleService;
pub use store::{AddMemberOutcome, CircleStore, InMemoryCircleStore};
pub use types::{
    ChangeRoleRequest, Circle, CircleMembership, CircleRole, CircleView, CreateCircleRequest,
    JoinCircleRequest, MemberView, ParseRoleError, UpdateCircleRequest,
};

use async_trait::async_trait;
use rand::Rng;

use crate::error::Result;

pub const INVITE_CODE_LEN: usize = 8;

/// Uppercase letters and digits without the look-alikes 0/O and 1/I.
pub const INVITE_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

pub fn generate_invite_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..INVITE_CODE_LEN)
        .map(|_| INVITE_CODE_ALPHABET[rng.gen_range(0..INVITE_CODE_ALPHABET.len())] as char)
        .collect()
}

/// Circle-scoped data that is dropped when its circle is deleted.
#[async_trait]
pub trait CircleCleanup: Send + Sync {
    async fn purge_circle(&self, circle_id: &str) -> Result<()>;
}
