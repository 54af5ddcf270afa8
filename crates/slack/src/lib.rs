//! Slack interface for deckhand.
//!
//! - **Socket Mode** (`socket`, `websocket`) - envelope loop with ack-first handling and reconnects
//! - **Commands** (`commands`) - `@bot <words...>` routed by longest whole-word prefix
//! - **Interactions** (`interactions`) - button and menu callbacks routed by action id
//! - **Events** (`events`) - envelope model, per-event context, reply delivery
//! - **Block Kit** (`blocks`, `views`) - message builders and every rendered reply
//! - **Web API** (`api`) - `chat.postMessage`, `chat.update`, `apps.connections.open`
//!
//! ```text
//! Socket Mode → SocketModeRunner → EventDispatcher → CommandRouter / InteractionDispatcher
//!                                        ↓                         ↓
//!                                  ChatClient  ←  views  ←  handlers (release, common, broadcast)
//! ```

pub mod api;
pub mod blocks;
pub mod commands;
pub mod events;
pub mod handlers;
pub mod interactions;
pub mod socket;
pub mod views;
pub mod websocket;

#[cfg(test)]
pub(crate) mod testing;
