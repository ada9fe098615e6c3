pub mod aggregate;
pub mod board;
pub mod domain;
pub mod export;
pub mod memory;
pub mod ports;
pub mod report;
pub mod service;
pub mod status;
pub mod validation;

pub use domain::{
    Acknowledgment, AcknowledgmentStatus, Assignment, AssignmentStatus, AuditLog, ChangeEvent,
    ChangeKind, Company, DocumentType, Notification, Priority, Role, Sop, SopStatus, Table, User,
    UserCredentials,
};
pub use ports::{
    ChangeCallback, ChangeFeed, DatabaseService, PortError, PortResult, Subscription,
};
pub use service::ComplianceService;
