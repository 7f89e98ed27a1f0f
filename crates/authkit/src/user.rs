//! Provider-agnostic user records and the per-provider API capability
//!
//! The engine knows how to authenticate and sign; it does not know where a
//! provider keeps its profile endpoint or what it calls the email field. A
//! concrete adapter supplies that knowledge as a `ProviderApi`. Every method
//! defaults to `Error::NotImplemented`, so a provider only implements what
//! it actually offers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::adapter::Adapter;
use crate::error::{Error, Result};
use ports::BoxFuture;

/// Authenticated user's profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Provider's stable user id.
    pub identifier: String,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub email_verified: Option<String>,
    pub profile_url: Option<String>,
    pub photo_url: Option<String>,
    pub web_site_url: Option<String>,
    pub description: Option<String>,
    pub gender: Option<String>,
    pub language: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub zip: Option<String>,
    /// Provider fields with no counterpart above.
    #[serde(default)]
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub identifier: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub profile_url: Option<String>,
    pub photo_url: Option<String>,
    pub web_site_url: Option<String>,
    pub description: Option<String>,
}

/// A page (or group, or company) the user administers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub identifier: String,
    pub name: Option<String>,
    pub url: Option<String>,
    pub photo_url: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityUser {
    pub identifier: String,
    pub display_name: Option<String>,
    pub profile_url: Option<String>,
    pub photo_url: Option<String>,
}

/// One item of a timeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: String,
    /// Unix seconds.
    pub date: Option<u64>,
    pub text: Option<String>,
    pub user: ActivityUser,
}

/// Which timeline `user_activity` reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ActivityStream {
    /// The user's own posts.
    Me,
    /// What the user sees: their posts and their contacts'.
    #[default]
    Timeline,
}

/// Status update posted through `set_user_status` / `set_page_status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub message: String,
    pub link: Option<String>,
    pub picture: Option<String>,
}

impl Status {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    pub fn with_picture(mut self, picture: impl Into<String>) -> Self {
        self.picture = Some(picture.into());
        self
    }
}

impl From<&str> for Status {
    fn from(message: &str) -> Self {
        Status::new(message)
    }
}

/// Provider-specific calls and field mapping.
///
/// Implementations issue their calls through `Adapter::api_request` (or
/// `Adapter::get`), so they get refresh, signing and the 401 replay for free.
/// Errors from the dispatcher must be returned unchanged, never turned into an
/// empty result.
pub trait ProviderApi: Send + Sync {
    fn user_profile<'a>(&'a self, adapter: &'a Adapter) -> BoxFuture<'a, Result<Profile>> {
        let _ = adapter;
        Box::pin(async { Err(Error::NotImplemented("user_profile")) })
    }

    fn user_contacts<'a>(&'a self, adapter: &'a Adapter) -> BoxFuture<'a, Result<Vec<Contact>>> {
        let _ = adapter;
        Box::pin(async { Err(Error::NotImplemented("user_contacts")) })
    }

    fn user_pages<'a>(&'a self, adapter: &'a Adapter) -> BoxFuture<'a, Result<Vec<Page>>> {
        let _ = adapter;
        Box::pin(async { Err(Error::NotImplemented("user_pages")) })
    }

    fn user_activity<'a>(
        &'a self,
        adapter: &'a Adapter,
        stream: ActivityStream,
    ) -> BoxFuture<'a, Result<Vec<Activity>>> {
        let _ = (adapter, stream);
        Box::pin(async { Err(Error::NotImplemented("user_activity")) })
    }

    /// Returns the provider's response.
    fn set_user_status<'a>(
        &'a self,
        adapter: &'a Adapter,
        status: Status,
    ) -> BoxFuture<'a, Result<Value>> {
        let _ = (adapter, status);
        Box::pin(async { Err(Error::NotImplemented("set_user_status")) })
    }

    fn set_page_status<'a>(
        &'a self,
        adapter: &'a Adapter,
        status: Status,
        page_id: &'a str,
    ) -> BoxFuture<'a, Result<Value>> {
        let _ = (adapter, status, page_id);
        Box::pin(async { Err(Error::NotImplemented("set_page_status")) })
    }
}

/// Adapter without provider-specific calls. Authentication and
/// `api_request` still work.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProviderApi;

impl ProviderApi for NoProviderApi {}
