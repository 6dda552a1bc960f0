//! The SCGI client context (spec §4.9), ported from
//! `original_source/src/scgi/scgi_context.cpp`: read one netstring
//! request, dispatch by method, write one HTTP/1.1 response, repeat
//! until the transport closes.

use std::rc::Rc;

use decof_core::{ClientContextBase, ContextCommon, DecofError, ObjectDictionary, Userlevel};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::netstring::{read_request, Method, ScgiRequest};
use crate::wire::{decode_put_body, encode_text_value};
use crate::xml::render_browse_xml;

pub struct ScgiContext {
    common: ContextCommon,
}

struct Response {
    status: u16,
    content_type: &'static str,
    body: String,
}

impl Response {
    fn render(&self) -> String {
        let reason = reason_phrase(self.status);
        format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\n\r\n{}",
            self.status,
            reason,
            self.content_type,
            self.body.len(),
            self.body
        )
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        _ => "Error",
    }
}

impl ScgiContext {
    pub fn new(dictionary: Rc<ObjectDictionary>) -> Rc<Self> {
        let rc = Rc::new(ScgiContext {
            common: ContextCommon::new(dictionary, Userlevel::Normal),
        });
        let dyn_rc: Rc<dyn ClientContextBase> = rc.clone();
        rc.common.install_self_rc(&dyn_rc);
        rc.dictionary().register_context(&dyn_rc);
        rc
    }

    /// Handles every request on `stream` in turn until the peer closes
    /// the connection (the original implementation re-arms `preload()`
    /// after each successful write, supporting more than one request per
    /// connection).
    pub async fn run(self: Rc<Self>, stream: TcpStream) {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        loop {
            let request = match read_request(&mut reader).await {
                Ok(req) => req,
                Err(_) => break,
            };
            let response = self.handle(&request);
            if write_half.write_all(response.render().as_bytes()).await.is_err() {
                break;
            }
        }
        self.close();
    }

    fn close(&self) {
        self.teardown();
        self.dictionary().remove_context(&self.self_rc());
    }

    fn handle(&self, request: &ScgiRequest) -> Response {
        let result = match request.method {
            Method::Get => self.handle_get(&request.uri),
            Method::Put => self.handle_put(request),
            Method::Post => self.handle_post(&request.uri),
        };
        match result {
            Ok(response) => response,
            Err(err) => Response {
                status: err.http_status(),
                content_type: "text/plain",
                body: format!("{err}\n"),
            },
        }
    }

    fn uri_to_colon(uri: &str) -> String {
        uri.trim_start_matches('/').replace('/', ":")
    }

    fn handle_get(&self, uri: &str) -> Result<Response, DecofError> {
        if uri == "/browse" || uri == "/browse/" {
            let object = self.browse(self.dictionary().root().name())?;
            return Ok(Response {
                status: 200,
                content_type: "text/xml",
                body: render_browse_xml(&object),
            });
        }
        let value = self.get(&Self::uri_to_colon(uri))?;
        Ok(Response {
            status: 200,
            content_type: "text/plain",
            body: encode_text_value(&value),
        })
    }

    fn handle_put(&self, request: &ScgiRequest) -> Result<Response, DecofError> {
        let content_type = request
            .headers
            .get("CONTENT_TYPE")
            .and_then(|ct| ct.strip_prefix("vnd/com.toptica.decof."))
            .ok_or_else(|| DecofError::WrongType {
                source: decof_value::ConversionError::InvalidValue {
                    reason: format!(
                        "missing or unrecognized Content-Type {:?}, expected vnd/com.toptica.decof.<type>",
                        request.headers.get("CONTENT_TYPE")
                    ),
                },
            })?;
        let value = decode_put_body(content_type, &request.body)?;
        self.set(&Self::uri_to_colon(&request.uri), value)?;
        Ok(Response {
            status: 200,
            content_type: "text/plain",
            body: String::new(),
        })
    }

    fn handle_post(&self, uri: &str) -> Result<Response, DecofError> {
        self.signal(&Self::uri_to_colon(uri))?;
        Ok(Response {
            status: 200,
            content_type: "text/plain",
            body: String::new(),
        })
    }
}

impl ClientContextBase for ScgiContext {
    fn common(&self) -> &ContextCommon {
        &self.common
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use decof_core::{Node, Parameter};

    fn fixture() -> Rc<ObjectDictionary> {
        let dict = ObjectDictionary::new("root");
        let scalars = Node::new("scalars");
        dict.root().add_child(scalars.as_dyn()).unwrap();
        let p = Parameter::managed_rw("x", Userlevel::Normal, Userlevel::Normal, 0i64, None);
        scalars.add_child(p.as_dyn()).unwrap();
        dict
    }

    #[test]
    fn get_renders_typed_plain_text() {
        let dict = fixture();
        let ctx = ScgiContext::new(dict);
        let resp = ctx.handle_get("/root/scalars/x").unwrap();
        assert_eq!(resp.body, "0");
        assert_eq!(resp.content_type, "text/plain");
    }

    #[test]
    fn put_writes_typed_value() {
        let dict = fixture();
        let ctx = ScgiContext::new(dict);
        let req = ScgiRequest {
            method: Method::Put,
            uri: "/root/scalars/x".to_string(),
            headers: [("CONTENT_TYPE".to_string(), "vnd/com.toptica.decof.integer".to_string())]
                .into_iter()
                .collect(),
            body: b"42".to_vec(),
        };
        let resp = ctx.handle_put(&req).unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(ctx.handle_get("/root/scalars/x").unwrap().body, "42");
    }

    #[test]
    fn get_browse_renders_xml() {
        let dict = fixture();
        let ctx = ScgiContext::new(dict);
        let resp = ctx.handle_get("/browse").unwrap();
        assert_eq!(resp.content_type, "text/xml");
        assert!(resp.body.contains("<module name=\"root\">"));
    }

    #[test]
    fn access_denied_maps_to_401() {
        let dict = fixture();
        let restricted = Parameter::managed_ro("secret", Userlevel::Service, 1i64);
        dict.root().add_child(restricted.as_dyn()).unwrap();
        let ctx = ScgiContext::new(dict);
        let resp = ctx.handle(&ScgiRequest {
            method: Method::Get,
            uri: "/root/secret".to_string(),
            headers: Default::default(),
            body: Vec::new(),
        });
        assert_eq!(resp.status, 401);
    }
}
