//! Live entity lists for the HR dashboards.
//!
//! A session owns one [`ConnectionManager`], the persistent channel to the
//! notification server, and hands it to every list view. Each view keeps a
//! [`LiveList`] per entity kind: loaded over REST, then kept current by the
//! `Created`/`Updated`/`Deleted` events other sessions broadcast, and
//! rendered through a pure search/sort/paginate step.
//!
//! ```text
//! RestClient ──load──▶ LiveList<E> ◀──apply── DeltaFeed<E> ◀── ConnectionManager
//!                          │
//!                          └── compute_view(ViewState) ──▶ ViewPage<E>
//! ```

pub mod config;
pub mod net;
pub mod state;

pub use config::{ConfigError, SyncConfig};
pub use net::api::{ApiError, EntityApi, GENERIC_ERROR_MESSAGE, RestClient};
pub use net::backoff::Backoff;
pub use net::connection::{ConnectionManager, ConnectionOptions, ConnectionState, ConnectionStatus, lifecycle};
pub use net::listeners::{HandlerId, Subscription};
pub use net::transport::{Connector, Transport, TransportError, WsConnector};
pub use state::entities::{Applicant, Contract, Department, Employee, Job};
pub use state::entity::{ChangeKind, Delta, DeltaError, Entity, EntityKind, SortValue};
pub use state::feed::DeltaFeed;
pub use state::live_list::{Broadcaster, ListChange, LiveList, MutationState, ObserverId};
pub use state::view::{SearchContext, SortDirection, SortSpec, ViewPage, ViewState, compute_view};
