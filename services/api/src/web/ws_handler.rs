//! services/api/src/web/ws_handler.rs
//!
//! Entry point and control loop for a live-update WebSocket connection.
//! The client picks tables to listen on; every matching change event that the
//! user is allowed to see is pushed as a `changed` message.

use crate::web::{
    protocol::{ClientMessage, ServerMessage},
    state::AppState,
};
use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    Extension,
};
use futures::{SinkExt, StreamExt};
use sop_compliance_core::domain::{ChangeEvent, Table, User};
use sop_compliance_core::ports::Subscription;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// The handler for upgrading HTTP requests to WebSocket connections.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(app_state): State<Arc<AppState>>,
    Extension(user): Extension<User>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, app_state, user))
}

/// Tenant isolation first; employees only hear about their own rows, except
/// changes to documents they can see.
pub fn visible_to(user: &User, event: &ChangeEvent) -> bool {
    if event.company_id != user.company_id {
        return false;
    }
    match event.table {
        Table::Notifications => event.user_id == Some(user.id),
        Table::Sops => !event.managers_only || user.role.can_manage(),
        _ if user.role.can_manage() => true,
        _ => event.user_id == Some(user.id),
    }
}

async fn handle_socket(socket: WebSocket, app_state: Arc<AppState>, user: User) {
    info!("New WebSocket connection established for user: {}", user.id);

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    // --- Writer: the only task that touches the sink ---
    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize server message: {:?}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // --- Reader: subscription bookkeeping ---
    let mut subscriptions: HashMap<Table, Subscription> = HashMap::new();
    while let Some(frame) = receiver.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("WebSocket error for user {}: {:?}", user.id, e);
                break;
            }
        };

        let reply = match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Subscribe { tables }) => {
                for table in tables {
                    subscriptions.entry(table).or_insert_with(|| {
                        let tx = tx.clone();
                        let viewer = user.clone();
                        app_state.feed.subscribe(
                            table,
                            Box::new(move |event: ChangeEvent| {
                                if visible_to(&viewer, &event) {
                                    let _ = tx.send(ServerMessage::Changed { event });
                                }
                            }),
                        )
                    });
                }
                ServerMessage::Subscribed {
                    tables: subscriptions.keys().copied().collect(),
                }
            }
            Ok(ClientMessage::Unsubscribe { table }) => {
                if let Some(sub) = subscriptions.remove(&table) {
                    sub.unsubscribe();
                }
                ServerMessage::Subscribed {
                    tables: subscriptions.keys().copied().collect(),
                }
            }
            Ok(ClientMessage::Ping) => ServerMessage::Pong,
            Err(e) => {
                debug!("Unparseable client message: {}", e);
                ServerMessage::Error {
                    message: format!("Invalid message: {}", e),
                }
            }
        };
        if tx.send(reply).is_err() {
            break;
        }
    }

    // Dropping the handles detaches every callback, which releases their senders.
    drop(subscriptions);
    drop(tx);
    let _ = writer.await;
    info!("WebSocket connection closed for user: {}", user.id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use sop_compliance_core::domain::{ChangeKind, Role};
    use uuid::Uuid;

    fn user(company_id: Uuid, role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            company_id,
            email: "pat@example.com".to_string(),
            full_name: "Pat".to_string(),
            department: None,
            role,
        }
    }

    fn event(table: Table, company_id: Uuid, user_id: Option<Uuid>) -> ChangeEvent {
        ChangeEvent {
            table,
            kind: ChangeKind::Insert,
            company_id,
            record_id: Uuid::new_v4(),
            user_id,
            managers_only: false,
        }
    }

    #[test]
    fn test_other_tenants_are_invisible() {
        let company = Uuid::new_v4();
        let admin = user(company, Role::Admin);
        assert!(!visible_to(&admin, &event(Table::Sops, Uuid::new_v4(), None)));
        assert!(visible_to(&admin, &event(Table::Sops, company, None)));
    }

    #[test]
    fn test_inactive_document_changes_reach_managers_only() {
        let company = Uuid::new_v4();
        let employee = user(company, Role::Employee);
        let manager = user(company, Role::Manager);
        let active = event(Table::Sops, company, Some(manager.id));
        let draft = ChangeEvent {
            managers_only: true,
            ..active.clone()
        };
        assert!(visible_to(&employee, &active));
        assert!(!visible_to(&employee, &draft));
        assert!(visible_to(&manager, &draft));
    }

    #[test]
    fn test_employee_sees_only_own_rows() {
        let company = Uuid::new_v4();
        let employee = user(company, Role::Employee);
        let manager = user(company, Role::Manager);
        let someone_else = event(Table::Acknowledgments, company, Some(Uuid::new_v4()));
        assert!(!visible_to(&employee, &someone_else));
        assert!(visible_to(&manager, &someone_else));
        assert!(visible_to(
            &employee,
            &event(Table::SopAssignments, company, Some(employee.id))
        ));
        // Notifications are private even to managers.
        assert!(!visible_to(
            &manager,
            &event(Table::Notifications, company, Some(employee.id))
        ));
    }
}
