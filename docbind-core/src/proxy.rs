//! Lazy value proxies.
//!
//! A [`Proxy`] stands in for a value whose construction is expensive, such
//! as loading a referenced document or finishing the conversion of a
//! decoded one. The deferred initializer runs exactly once, on first
//! access; the result is cached and every later access sees the same value.
//!
//! Proxies are cheap to clone and share their state: forcing one clone
//! resolves them all.

use std::{
    fmt,
    sync::{Arc, Mutex, PoisonError},
};

use crate::{
    error::{BindError, BindResult},
    value::Value,
};

type Initializer = Box<dyn FnOnce() -> BindResult<Value> + Send>;

enum ProxyState {
    Unresolved(Initializer),
    Resolved(Value),
    Failed(BindError),
}

/// A placeholder that defers materialization of a value until first access.
///
/// The proxy remembers the class name of the entity it will produce, so
/// callers can inspect what a reference points at without loading it.
#[derive(Clone)]
pub struct Proxy {
    class: Arc<str>,
    state: Arc<Mutex<ProxyState>>,
}

impl Proxy {
    /// Creates a proxy whose first access runs `initializer` exactly once.
    pub fn new<F>(class: impl Into<String>, initializer: F) -> Self
    where
        F: FnOnce() -> BindResult<Value> + Send + 'static,
    {
        Self {
            class: Arc::from(class.into()),
            state: Arc::new(Mutex::new(ProxyState::Unresolved(Box::new(initializer)))),
        }
    }

    /// The class name of the value this proxy will materialize.
    pub fn class_name(&self) -> &str {
        &self.class
    }

    /// Returns `true` once the initializer has run successfully.
    pub fn is_resolved(&self) -> bool {
        matches!(&*self.lock(), ProxyState::Resolved(_))
    }

    /// Forces materialization. A no-op once resolved; a failed initializer
    /// is remembered and its error re-raised on every later access.
    pub fn force(&self) -> BindResult<()> {
        let mut state = self.lock();

        match &*state {
            ProxyState::Resolved(_) => return Ok(()),
            ProxyState::Failed(err) => return Err(err.clone()),
            ProxyState::Unresolved(_) => {}
        }

        let placeholder =
            ProxyState::Failed(BindError::InvalidReference("proxy initializer re-entered".to_string()));
        if let ProxyState::Unresolved(initializer) = std::mem::replace(&mut *state, placeholder) {
            match initializer() {
                Ok(value) => *state = ProxyState::Resolved(value),
                Err(err) => {
                    *state = ProxyState::Failed(err.clone());
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    /// Returns the materialized value, forcing first when needed.
    pub fn value(&self) -> BindResult<Value> {
        self.force()?;

        match &*self.lock() {
            ProxyState::Resolved(value) => Ok(value.clone()),
            ProxyState::Failed(err) => Err(err.clone()),
            ProxyState::Unresolved(_) => Err(BindError::InvalidReference(
                "proxy left unresolved after forcing".to_string(),
            )),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ProxyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("class", &self.class)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
