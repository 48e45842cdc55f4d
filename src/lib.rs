//! Mock Studio
//!
//! A mock banking-administration API whose endpoints can be invented at
//! runtime. Administrators register mock definitions over HTTP and every
//! request that misses the management routes is answered by the mock engine.
//!
//! # Features
//!
//! - **Dynamic Mocks**: Register method + path stubs over the API, no restart
//! - **Conditional Rules**: First-match rules over query, headers, body, params
//! - **Expression Conditions**: A small boolean expression language for
//!   predicates that single-field operators cannot express
//! - **Dynamic Templates**: Use Handlebars templates for dynamic responses
//! - **Latency Simulation**: Per-mock fixed delays
//! - **Failure Injection**: Per-mock probabilistic 500 responses
//! - **Persistence**: Debounced JSON snapshots of the in-memory dataset
//!
//! # Example Mock
//!
//! ```json
//! {
//!   "name": "vip lookup",
//!   "method": "GET",
//!   "path": "/accounts",
//!   "response_body": {"tier": "standard"},
//!   "rules": [
//!     {
//!       "name": "vip",
//!       "conditions": [
//!         {"source": "query", "key": "tier", "operator": "equals", "value": "vip"}
//!       ],
//!       "response": {"body": {"tier": "vip"}, "status_code": 200}
//!     }
//!   ]
//! }
//! ```

pub mod auth;
pub mod config;
pub mod dispatch;
pub mod entities;
pub mod error;
pub mod evaluator;
pub mod expr;
pub mod fault;
pub mod model;
pub mod registry;
pub mod selector;
pub mod server;
pub mod store;
pub mod template;

pub use config::ServerConfig;
pub use error::ApiError;
pub use model::{Condition, ConditionOperator, ConditionSource, MockDefinition, Rule};
pub use server::AppState;
pub use store::Store;
