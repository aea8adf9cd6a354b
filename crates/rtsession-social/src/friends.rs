//! Account info and friends list.

use std::sync::Arc;

use rtsession_core::{
    Backend,
    message::{Friend, Request, Response, SelfInfo},
};
use tokio::sync::RwLock;

use crate::{SocialError, log_error};

#[derive(Default)]
struct SocialState {
    self_info: Option<SelfInfo>,
    friends: Vec<Friend>,
}

/// Cached view of the user's account and friends.
///
/// Every call goes to the backend; the cache holds the last good answer.
pub struct SocialDirectory<B: Backend> {
    backend: Arc<B>,
    state: RwLock<SocialState>,
}

impl<B: Backend> SocialDirectory<B> {
    #[must_use]
    pub fn new(backend: Arc<B>) -> Self {
        Self {
            backend,
            state: RwLock::new(SocialState::default()),
        }
    }

    async fn send(&self, request: Request) -> Result<Response, SocialError> {
        self.backend.send(request).await.map_err(|e| {
            log_error(&e);
            SocialError::Backend(e)
        })
    }

    /// Fetch and cache the connected user's account.
    ///
    /// # Errors
    /// Returns error if the backend rejects the request.
    pub async fn self_fetch(&self) -> Result<SelfInfo, SocialError> {
        match self.send(Request::SelfFetch).await? {
            Response::SelfInfo(info) => {
                self.state.write().await.self_info = Some(info.clone());
                Ok(info)
            }
            _ => Err(SocialError::UnexpectedResponse("self_fetch")),
        }
    }

    /// Last fetched account info.
    pub async fn self_info(&self) -> Option<SelfInfo> {
        self.state.read().await.self_info.clone()
    }

    /// Add a friend, optionally refreshing the cached list afterwards.
    ///
    /// # Errors
    /// Returns error if the add or the refresh fails.
    pub async fn friend_add(&self, user_id: &str, refresh: bool) -> Result<(), SocialError> {
        self.send(Request::FriendAdd {
            user_id: user_id.to_string(),
        })
        .await?;

        if refresh {
            self.friends_list().await?;
        }
        Ok(())
    }

    /// Remove a friend and refresh the cached list.
    ///
    /// # Errors
    /// Returns error if the remove or the refresh fails.
    pub async fn friend_remove(&self, user_id: &str) -> Result<(), SocialError> {
        self.send(Request::FriendRemove {
            user_id: user_id.to_string(),
        })
        .await?;

        self.friends_list().await?;
        Ok(())
    }

    /// Fetch the friends list and replace the cache with it.
    ///
    /// # Errors
    /// Returns error if the backend rejects the request.
    pub async fn friends_list(&self) -> Result<Vec<Friend>, SocialError> {
        match self.send(Request::FriendsList).await? {
            Response::Friends { friends } => {
                self.state.write().await.friends.clone_from(&friends);
                Ok(friends)
            }
            _ => Err(SocialError::UnexpectedResponse("friends_list")),
        }
    }

    /// Cached friends list.
    pub async fn friends(&self) -> Vec<Friend> {
        self.state.read().await.friends.clone()
    }
}
