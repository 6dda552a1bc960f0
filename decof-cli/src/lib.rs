//! CLI protocol front-ends: line-oriented request/response (§4.7) and
//! publish/subscribe (§4.8), plus the textual value grammar (§4.10) and
//! the `browse`/`tree` renderers (§6) both share.

mod browse;
mod grammar;
mod pubsub;
mod request_response;
mod wire;

pub use browse::{render_browse, render_tree};
pub use grammar::{encode_value, parse_value};
pub use pubsub::PubSubContext;
pub use request_response::ClisrvContext;
