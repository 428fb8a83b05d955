//! Ties the hub's connection to an external authentication signal.

use crate::client::RealtimeClient;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

/// Authentication state published by the session provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthState {
    /// Whether the user is signed in.
    pub is_authenticated: bool,
    /// Stable user identifier.
    pub user_id: Option<String>,
}

impl AuthState {
    /// Signed-in state for `user_id`.
    pub fn authenticated(user_id: impl Into<String>) -> Self {
        Self {
            is_authenticated: true,
            user_id: Some(user_id.into()),
        }
    }

    /// Signed-out state.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// The user to connect as: present only when signed in with a non-empty id.
    pub fn identity(&self) -> Option<&str> {
        if !self.is_authenticated {
            return None;
        }
        self.user_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// Connects the hub while a user is signed in and disconnects otherwise.
///
/// The binder owns the teardown of its client: [`shutdown`](Self::shutdown),
/// dropping the binder, or the auth sender going away all disconnect the hub
/// and drop every subscription.
#[derive(Debug)]
pub struct LifecycleBinder {
    client: RealtimeClient,
    task: Option<JoinHandle<()>>,
}

impl LifecycleBinder {
    /// Start following `auth`. The current value is applied immediately.
    pub fn spawn(client: RealtimeClient, mut auth: watch::Receiver<AuthState>) -> Self {
        let hub = client.clone();
        let task = tokio::spawn(async move {
            let mut applied: Option<Option<String>> = None;
            loop {
                let identity = auth.borrow_and_update().identity().map(str::to_string);
                if applied.as_ref() != Some(&identity) {
                    let previous = applied.flatten();
                    apply(&hub, previous.as_deref(), identity.as_deref());
                    applied = Some(identity);
                }

                if auth.changed().await.is_err() {
                    debug!("Auth provider gone, tearing down real-time hub");
                    hub.teardown();
                    break;
                }
            }
        });

        Self {
            client,
            task: Some(task),
        }
    }

    /// The bound client.
    pub fn client(&self) -> &RealtimeClient {
        &self.client
    }

    /// Stop following auth changes, disconnect and drop all subscriptions.
    pub async fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.client.shutdown().await;
    }
}

impl Drop for LifecycleBinder {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            self.client.teardown();
        }
    }
}

fn apply(client: &RealtimeClient, previous: Option<&str>, next: Option<&str>) {
    match next {
        Some(user_id) => {
            if previous.is_some_and(|prev| prev != user_id) {
                // Reopen under the new identity.
                client.disconnect();
            }
            debug!(user_id = %user_id, "Authenticated, connecting");
            client.set_identity(Some(user_id.to_string()));
            client.connect();
        }
        None => {
            debug!("Not authenticated, disconnecting");
            client.set_identity(None);
            client.disconnect();
        }
    }
}
