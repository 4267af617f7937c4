/*!
Data contracts shared between the untrusted event source, the trusted auditor
and the dashboard: the line-delimited telemetry record, the audit record that
the auditor appends to the trail, and the read side of that trail.
*/

pub mod error;
pub mod event;
pub mod graph;
pub mod html;
pub mod reader;
pub mod record;
pub mod stats;

pub use error::{ContractError, TrailError};
pub use event::DeviceEvent;
pub use graph::{GraphEdge, GraphNode, NodeKind, ProvenanceGraph};
pub use html::render_dashboard;
pub use reader::{TrailSnapshot, load_trail, parse_trail};
pub use record::{AlertSet, AuditRecord, Violation, unix_seconds};
pub use stats::TrailStats;
