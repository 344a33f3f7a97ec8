//! Scoped ownership of a session.

use tracing::{debug, warn};

use super::Session;
use crate::error::{Error, Result};

/// Holds a session and guarantees it is closed exactly once.
///
/// The normal path calls [`SessionGuard::close`]. If the guard is dropped
/// while still holding the session (the owning future was cancelled or
/// panicked), the close is spawned onto the current tokio runtime.
pub struct SessionGuard {
    session: Option<Box<dyn Session>>,
}

impl SessionGuard {
    /// Take ownership of an open session.
    #[must_use]
    pub fn new(session: Box<dyn Session>) -> Self {
        Self {
            session: Some(session),
        }
    }

    /// Borrow the session for queries.
    pub fn session(&mut self) -> Result<&mut (dyn Session + 'static)> {
        self.session
            .as_deref_mut()
            .ok_or_else(|| Error::Protocol("session used after release".to_string()))
    }

    /// Close the session and report the outcome.
    pub async fn close(mut self) -> Result<()> {
        match self.session.take() {
            Some(session) => {
                debug!("Closing session {}", session.label());
                session.close().await
            }
            None => Ok(()),
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let label = session.label().to_string();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Session {} released without close, closing in background", label);
                handle.spawn(async move {
                    if let Err(e) = session.close().await {
                        warn!("Background close of {} failed: {}", label, e);
                    }
                });
            }
            Err(_) => {
                warn!("No runtime to close session {}, dropping connection", label);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionOptions;
    use crate::session::scripted::ScriptedFactory;
    use crate::session::SessionFactory;

    #[tokio::test]
    async fn test_close_releases_once() {
        let factory = ScriptedFactory::echo();
        let session = factory.open(&ConnectionOptions::default()).await.unwrap();
        let guard = SessionGuard::new(session);
        guard.close().await.unwrap();

        tokio::task::yield_now().await;
        assert_eq!(factory.probe().closed(), 1);
    }

    #[tokio::test]
    async fn test_drop_closes_in_background() {
        let factory = ScriptedFactory::echo();
        let session = factory.open(&ConnectionOptions::default()).await.unwrap();
        drop(SessionGuard::new(session));

        factory.probe().wait_closed(1).await;
        assert_eq!(factory.probe().closed(), 1);
    }

    #[test]
    fn test_drop_without_runtime_does_not_panic() {
        let factory = ScriptedFactory::echo();
        let session = tokio_test::block_on(factory.open(&ConnectionOptions::default())).unwrap();
        drop(SessionGuard::new(session));
        assert_eq!(factory.probe().closed(), 0);
    }
}
