//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between the browser client and the API
//! server for live compliance updates.

use serde::{Deserialize, Serialize};
use sop_compliance_core::domain::{ChangeEvent, Table};

//=========================================================================================
// Messages Sent FROM the Client (Browser) TO the Server
//=========================================================================================

/// Represents the structured text messages a client can send to the server.
#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Starts listening on the given tables. Already subscribed tables are kept.
    Subscribe { tables: Vec<Table> },

    /// Stops listening on one table.
    Unsubscribe { table: Table },

    Ping,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client (Browser)
//=========================================================================================

/// Represents the structured text messages the server can send to the client.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Confirms the tables the connection currently listens on.
    Subscribed { tables: Vec<Table> },

    /// A row changed; the client should refetch whatever view depends on `table`.
    Changed { event: ChangeEvent },

    /// Reports a problem with the last client message.
    Error { message: String },

    Pong,
}
