//! The line-oriented CLI request/response context (spec §4.7).
//!
//! Per-connection state machine: `Idle -> Reading -> Dispatching -> Writing
//! -> Idle`, collapsed here into a read-dispatch-write loop over a single
//! `tokio::net::TcpStream` — on a single-threaded executor a loop iteration
//! already is the state machine, there is no concurrent reader/writer to
//! race against it.

use std::rc::Rc;

use decof_core::{ClientContextBase, ContextCommon, DecofError, ObjectDictionary, Userlevel};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::browse::{render_browse, render_tree};
use crate::grammar::{encode_value, parse_value};
use crate::wire::{qualify_uri, split_first_word, strip_line, strip_quote_sigil};

const BANNER: &str = "DeCoF command line\n";
const PROMPT: &str = "> ";

/// A single CLI request/response connection.
pub struct ClisrvContext {
    common: ContextCommon,
}

impl ClisrvContext {
    pub fn new(dictionary: Rc<ObjectDictionary>) -> Rc<Self> {
        let rc = Rc::new(ClisrvContext {
            common: ContextCommon::new(dictionary, Userlevel::Normal),
        });
        let dyn_rc: Rc<dyn ClientContextBase> = rc.clone();
        rc.common.install_self_rc(&dyn_rc);
        rc.dictionary().register_context(&dyn_rc);
        rc
    }

    /// Drives the connection to completion: writes the banner, then reads
    /// and answers one command per line until the transport closes.
    pub async fn run(self: Rc<Self>, stream: TcpStream) {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        if write_half
            .write_all(format!("{BANNER}{PROMPT}").as_bytes())
            .await
            .is_err()
        {
            self.close();
            return;
        }

        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => {
                    let response = self.dispatch(&line);
                    if write_half.write_all(response.as_bytes()).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::debug!("cli request/response read error: {e}");
                    break;
                }
            }
        }
        self.close();
    }

    fn close(&self) {
        self.teardown();
        self.dictionary().remove_context(&self.self_rc());
    }

    /// Parses and runs one command line, returning the full text to write
    /// back including the trailing prompt.
    fn dispatch(&self, line: &str) -> String {
        let trimmed = strip_line(line);
        if trimmed.is_empty() {
            return PROMPT.to_string();
        }

        let mut body = match self.handle_command(trimmed) {
            Ok(body) => body,
            Err(err) => format!("ERROR {}: {}\n", err.code(), err),
        };
        body.push_str(PROMPT);
        body
    }

    fn handle_command(&self, line: &str) -> Result<String, DecofError> {
        let (op, uri_token, rest) = split_command(line);
        let op = op.to_ascii_lowercase();
        let uri = qualify_uri(self.dictionary(), strip_quote_sigil(uri_token));

        let ul_uri = format!("{}{}ul", self.dictionary().root().name(), self.dictionary().separator());
        let change_ul_uri = format!(
            "{}{}change-ul",
            self.dictionary().root().name(),
            self.dictionary().separator()
        );

        match op.as_str() {
            "get" | "param-ref" if !uri.is_empty() && rest.trim().is_empty() => {
                if uri == ul_uri {
                    Ok(format!("{}\n", self.userlevel().as_i64()))
                } else {
                    let value = self.get(&uri)?;
                    Ok(format!("{}\n", encode_value(&value)))
                }
            }
            "set" | "param-set!" if !uri.is_empty() && !rest.trim().is_empty() => {
                let value = parse_value(rest)?;
                self.set(&uri, value)?;
                Ok("0\n".to_string())
            }
            "exec" | "signal" if !uri.is_empty() && uri == change_ul_uri => {
                let (level, password) = parse_change_ul(rest)?;
                let requested = Userlevel::from_assignable_i64(level)
                    .ok_or(DecofError::InvalidUserlevel { level })?;
                self.change_userlevel(requested, &password)?;
                Ok(format!("{}\n", self.userlevel().as_i64()))
            }
            "exec" | "signal" if !uri.is_empty() && rest.trim().is_empty() => {
                self.signal(&uri)?;
                Ok("()\n".to_string())
            }
            "browse" | "param-disp" if rest.trim().is_empty() => {
                let browse_uri = if uri.is_empty() {
                    self.dictionary().root().name().to_string()
                } else {
                    uri
                };
                let object = self.browse(&browse_uri)?;
                let mut out = String::new();
                render_browse(&object, &mut out);
                Ok(out)
            }
            "tree" if rest.trim().is_empty() => {
                let tree_uri = if uri.is_empty() {
                    self.dictionary().root().name().to_string()
                } else {
                    uri
                };
                let object = self.browse(&tree_uri)?;
                let mut out = String::new();
                render_tree(&object, self.dictionary().separator(), &mut out);
                Ok(out)
            }
            "get" | "param-ref" | "set" | "param-set!" | "exec" | "signal" | "browse" | "param-disp" | "tree" => {
                Err(DecofError::ParseError {
                    reason: format!("malformed {op} command"),
                })
            }
            _ => Err(DecofError::UnknownOperation { op }),
        }
    }
}

impl ClientContextBase for ClisrvContext {
    fn common(&self) -> &ContextCommon {
        &self.common
    }
}

fn split_command(s: &str) -> (&str, &str, &str) {
    let s = s.trim_start();
    let (op, rest) = split_first_word(s);
    let rest = rest.trim_start();
    let (uri, rest) = split_first_word(rest);
    (op, uri, rest.trim_start())
}

fn parse_change_ul(rest: &str) -> Result<(i64, String), DecofError> {
    let rest = rest.trim_start();
    let (level_tok, remainder) = split_first_word(rest);
    let level: i64 = level_tok.parse().map_err(|_| DecofError::ParseError {
        reason: format!("{level_tok:?} is not a valid userlevel"),
    })?;
    let password = remainder.trim().trim_matches('"').to_string();
    Ok((level, password))
}

#[cfg(test)]
mod tests {
    use super::*;
    use decof_core::Parameter;

    fn fixture() -> Rc<ObjectDictionary> {
        let dict = ObjectDictionary::new("test");
        let scalars = decof_core::Node::new("scalars");
        dict.root().add_child(scalars.as_dyn()).unwrap();
        let rw = Parameter::managed_rw("integer_rw", Userlevel::Normal, Userlevel::Normal, 0i64, None);
        scalars.add_child(rw.as_dyn()).unwrap();
        let ro = Parameter::managed_ro("binary_ro", Userlevel::Normal, b"decof".to_vec());
        dict.root().add_child(ro.as_dyn()).unwrap();
        dict.set_authenticator(Box::new(|_, level, password| {
            level == Userlevel::Internal && password == "internal"
        }));
        dict
    }

    #[test]
    fn scenario_managed_rw_round_trip() {
        let dict = fixture();
        let ctx = ClisrvContext::new(dict);
        assert_eq!(ctx.dispatch("set test:scalars:integer_rw -42\n"), "0\n> ");
        assert_eq!(
            ctx.dispatch("get test:scalars:integer_rw\n"),
            "-42\n> "
        );
    }

    #[test]
    fn scenario_binary_base64_and_readonly_write_denied() {
        let dict = fixture();
        let ctx = ClisrvContext::new(dict);
        assert_eq!(ctx.dispatch("get test:binary_ro\n"), "&ZGVjb2Y=\n> ");
        assert_eq!(
            ctx.dispatch("set test:binary_ro &bm9wZQ==\n"),
            "ERROR 3: Access denied\n> "
        );
        assert_eq!(ctx.dispatch("get test:binary_ro\n"), "&ZGVjb2Y=\n> ");
    }

    #[test]
    fn scenario_change_userlevel() {
        let dict = fixture();
        let ctx = ClisrvContext::new(dict);
        assert_eq!(ctx.dispatch("param-ref 'ul\n"), "1\n> ");
        assert_eq!(
            ctx.dispatch("exec 'change-ul 0 \"internal\"\n"),
            "0\n> "
        );
        assert_eq!(ctx.dispatch("param-ref 'ul\n"), "0\n> ");
    }

    #[test]
    fn unknown_operation_reports_taxonomy_code_seven() {
        let dict = fixture();
        let ctx = ClisrvContext::new(dict);
        assert_eq!(
            ctx.dispatch("frobnicate root:x\n"),
            "ERROR 7: Unknown operation: frobnicate\n> "
        );
    }

    #[test]
    fn tree_and_browse_render_without_error() {
        let dict = fixture();
        let ctx = ClisrvContext::new(dict);
        let tree = ctx.dispatch("tree\n");
        assert!(tree.contains("root:scalars:integer_rw PARAM RW INTEGER"));
        let browse = ctx.dispatch("browse\n");
        assert!(browse.contains(":integer_rw = 0"));
    }
}
