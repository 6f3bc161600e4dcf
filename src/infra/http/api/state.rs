use std::sync::Arc;

use crate::application::auth::AuthService;
use crate::application::comments::CommentService;
use crate::application::favorites::FavoriteService;
use crate::application::notifications::NotificationService;
use crate::application::posts::PostService;
use crate::application::taxonomy::TaxonomyService;
use crate::application::tokens::TokenCodec;
use crate::application::users::UserService;
use crate::infra::uploads::AvatarStore;

/// Shared state handed to every API handler. Services sit behind `Arc`
/// so router clones stay cheap.
#[derive(Clone)]
pub struct ApiState {
    pub auth: Arc<AuthService>,
    pub posts: Arc<PostService>,
    pub comments: Arc<CommentService>,
    pub favorites: Arc<FavoriteService>,
    pub notifications: Arc<NotificationService>,
    pub taxonomy: Arc<TaxonomyService>,
    pub users: Arc<UserService>,
    pub tokens: TokenCodec,
    pub avatars: Arc<AvatarStore>,
    /// Body cap for the multipart profile route, in bytes.
    pub upload_limit: usize,
}
