//! The SCGI protocol front-end (spec §4.9) and browse XML renderer
//! (spec §6).

mod context;
mod netstring;
mod wire;
mod xml;

pub use context::ScgiContext;
pub use netstring::{read_request, Method, ScgiRequest};
pub use wire::{decode_put_body, encode_text_value};
pub use xml::render_browse_xml;
