//! Child stdout forwarding.
//!
//! [`OutputHandlers`] is an ordered list of callbacks. [`spawn_pump`] reads
//! the child's stdout line by line on a background task and invokes every
//! handler, in registration order, for each line.

use std::sync::{Arc, PoisonError, RwLock};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Callback invoked with one line of child output (terminator stripped).
pub type OutputHandler = Box<dyn Fn(&str) + Send + Sync>;

/// Ordered, shareable list of output callbacks.
#[derive(Clone, Default)]
pub struct OutputHandlers {
    inner: Arc<RwLock<Vec<OutputHandler>>>,
}

impl OutputHandlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler; it runs after every handler registered before it.
    pub fn push(&self, handler: impl Fn(&str) + Send + Sync + 'static) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(handler));
    }

    /// Drop every registered handler.
    pub fn clear(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every handler with `line`, in registration order.
    pub fn dispatch(&self, line: &str) {
        let handlers = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        for handler in handlers.iter() {
            handler(line);
        }
    }
}

impl std::fmt::Debug for OutputHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputHandlers")
            .field("len", &self.len())
            .finish()
    }
}

/// Forward lines from `reader` to `handlers` until EOF or a read error.
pub fn spawn_pump<R>(reader: R, handlers: OutputHandlers) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => handlers.dispatch(&line),
                Ok(None) => {
                    debug!("Child stdout closed");
                    break;
                }
                Err(e) => {
                    warn!("Child stdout read error: {e}");
                    break;
                }
            }
        }
    })
}
