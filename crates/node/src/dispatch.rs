//! Transport-facing command dispatch with category-level access control.

use blinknet_core::InboundMessage;
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Why an inbound message was dropped instead of dispatched.
///
/// [`UnknownCommand`](DispatchError::UnknownCommand) under a registered
/// category is routine (a newer peer speaking a newer protocol) and is
/// simply ignored by callers; the other variants indicate a misdirected or
/// unauthorized sender.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The command's category was never registered.
    #[error("no category registered for \"{command}\"")]
    UnknownCategory {
        /// The offending command name.
        command: String,
    },

    /// The category requires an authenticated service-node sender.
    #[error("\"{command}\" is restricted to service-node senders")]
    AccessDenied {
        /// The offending command name.
        command: String,
    },

    /// No handler is registered for this command in an allowed category.
    #[error("no handler registered for \"{command}\"")]
    UnknownCommand {
        /// The offending command name.
        command: String,
    },
}

/// Who may send commands in a category, and who they are addressed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CategoryAccess {
    /// Service node to service node only.
    SnToSn,
    /// Anyone may send; the recipient is a service node.
    OpenToSn,
    /// Service nodes send; the recipient may be an open (non-SN) node.
    SnToOpen,
}

impl CategoryAccess {
    /// Whether the sender of this category's messages must be an
    /// authenticated service node.
    fn requires_sn_sender(self) -> bool {
        matches!(self, CategoryAccess::SnToSn | CategoryAccess::SnToOpen)
    }
}

struct Category {
    access: CategoryAccess,
    /// Transport worker threads reserved for this category so one flood
    /// cannot starve the others.
    reserved_workers: usize,
}

type Handler = Box<dyn Fn(&InboundMessage) + Send + Sync>;

/// Maps transport categories and command names to component handlers.
///
/// Thread-safe via `RwLock`: registration happens once at startup, dispatch
/// runs hot from the transport's worker pool. Unknown commands under a
/// registered category are ignored, unregistered categories are dropped
/// loudly, and access violations are logged and dropped.
#[derive(Default)]
pub struct CommandDispatcher {
    categories: RwLock<HashMap<String, Category>>,
    commands: RwLock<HashMap<String, Handler>>,
}

impl CommandDispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a category with its access policy and reserved transport
    /// workers.
    pub fn register_category(
        &self,
        name: &str,
        access: CategoryAccess,
        reserved_workers: usize,
    ) {
        self.categories.write().insert(
            name.to_string(),
            Category {
                access,
                reserved_workers,
            },
        );
    }

    /// Register a handler for a full command name (`category.command`).
    ///
    /// # Panics
    ///
    /// Panics if the command's category has not been registered; command
    /// tables are wired once at startup and a miss is a programming error.
    pub fn register_command(
        &self,
        command: &str,
        handler: impl Fn(&InboundMessage) + Send + Sync + 'static,
    ) {
        let category = command
            .split_once('.')
            .map(|(category, _)| category)
            .unwrap_or(command);
        assert!(
            self.categories.read().contains_key(category),
            "command {command} registered before its category"
        );
        self.commands
            .write()
            .insert(command.to_string(), Box::new(handler));
    }

    /// Reserved worker count for a category (transport configuration).
    pub fn reserved_workers(&self, category: &str) -> Option<usize> {
        self.categories.read().get(category).map(|c| c.reserved_workers)
    }

    /// Dispatch an inbound message to its handler.
    ///
    /// A [`DispatchError`] means the message was dropped without running a
    /// handler; the transport logs-and-ignores it.
    pub fn dispatch(&self, msg: &InboundMessage) -> Result<(), DispatchError> {
        let category_name = msg
            .command
            .split_once('.')
            .map(|(category, _)| category)
            .unwrap_or(&msg.command);

        {
            let categories = self.categories.read();
            let Some(category) = categories.get(category_name) else {
                warn!(command = %msg.command, "dropping message for unregistered category");
                return Err(DispatchError::UnknownCategory {
                    command: msg.command.clone(),
                });
            };
            if category.access.requires_sn_sender() && !msg.is_from_sn() {
                info!(
                    command = %msg.command,
                    conn = %msg.conn,
                    "dropping SN-only command from non-SN sender"
                );
                return Err(DispatchError::AccessDenied {
                    command: msg.command.clone(),
                });
            }
        }

        let commands = self.commands.read();
        let Some(handler) = commands.get(&msg.command) else {
            // Allowed category, unknown command: likely a newer peer.
            trace!(command = %msg.command, "ignoring unknown command");
            return Err(DispatchError::UnknownCommand {
                command: msg.command.clone(),
            });
        };
        debug!(command = %msg.command, "dispatching quorum command");
        handler(msg);
        Ok(())
    }
}
