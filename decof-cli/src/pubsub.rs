//! The line-oriented CLI publish/subscribe context (spec §4.8).
//!
//! Unlike the request/response context, most of the traffic on this
//! connection is unsolicited: a parameter change fires a closure
//! registered with [`ClientContextBase::observe`], which runs on whatever
//! task happens to be setting that parameter, not on this connection's own
//! task. The two are stitched together with a [`tokio::sync::Notify`] —
//! the notifying side never blocks, and the connection's own loop wakes up
//! to drain whatever has accumulated since it last looked.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use chrono::Utc;
use decof_core::{ClientContextBase, ContextCommon, DecofError, ObjectDictionary, Userlevel};
use decof_value::Value;
use indexmap::IndexMap;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Notify;

use crate::grammar::encode_value;
use crate::wire::{qualify_uri, split_first_word, strip_line, strip_quote_sigil};

/// Rough stand-in for "the socket's send-buffer size" (spec §4.8): a
/// batch is flushed once it reaches this many encoded bytes, even if more
/// updates are still pending, so one very chatty parameter cannot starve
/// the others.
const MAX_BATCH_BYTES: usize = 64 * 1024;

/// A single CLI publish/subscribe connection.
///
/// Holds at most one pending update per observed URI (spec §4.8
/// "coalescing buffer"); a parameter that changes again before its
/// previous update is flushed has its value replaced and moves to the
/// tail of the queue, so a client watching many parameters never falls
/// permanently behind on any one of them.
pub struct PubSubContext {
    common: ContextCommon,
    pending: RefCell<IndexMap<String, (Value, chrono::DateTime<Utc>)>>,
    notify: Notify,
    self_weak: RefCell<Weak<PubSubContext>>,
}

impl PubSubContext {
    pub fn new(dictionary: Rc<ObjectDictionary>) -> Rc<Self> {
        let rc = Rc::new(PubSubContext {
            common: ContextCommon::new(dictionary, Userlevel::Normal),
            pending: RefCell::new(IndexMap::new()),
            notify: Notify::new(),
            self_weak: RefCell::new(Weak::new()),
        });
        *rc.self_weak.borrow_mut() = Rc::downgrade(&rc);
        let dyn_rc: Rc<dyn ClientContextBase> = rc.clone();
        rc.common.install_self_rc(&dyn_rc);
        rc.dictionary().register_context(&dyn_rc);
        rc
    }

    pub async fn run(self: Rc<Self>, stream: TcpStream) {
        let (read_half, mut write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let mut line = String::new();

        loop {
            line.clear();
            tokio::select! {
                result = reader.read_line(&mut line) => {
                    match result {
                        Ok(0) => break,
                        Ok(_) => {
                            if let Err(err) = self.handle_command(&line) {
                                let msg = format!("ERROR {}: {}\n", err.code(), err);
                                if write_half.write_all(msg.as_bytes()).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Err(e) => {
                            log::debug!("cli pub/sub read error: {e}");
                            break;
                        }
                    }
                }
                _ = self.notify.notified() => {
                    let batch = self.drain_batch();
                    if !batch.is_empty() && write_half.write_all(batch.as_bytes()).await.is_err() {
                        break;
                    }
                }
            }
        }
        self.close();
    }

    fn close(&self) {
        self.teardown();
        self.dictionary().remove_context(&self.self_rc());
    }

    fn handle_command(&self, line: &str) -> Result<(), DecofError> {
        let trimmed = strip_line(line);
        if trimmed.is_empty() {
            return Ok(());
        }
        let (op, rest) = split_first_word(trimmed);
        let op = op.to_ascii_lowercase();
        let uri_token = rest.trim();
        if uri_token.is_empty() {
            return Err(DecofError::ParseError {
                reason: format!("{op} requires a uri"),
            });
        }
        let uri = qualify_uri(self.dictionary(), strip_quote_sigil(uri_token));

        match op.as_str() {
            "subscribe" | "add" => self.subscribe(&uri),
            "unsubscribe" | "remove" => self.unobserve(&uri),
            _ => Err(DecofError::UnknownOperation { op }),
        }
    }

    fn subscribe(&self, uri: &str) -> Result<(), DecofError> {
        let weak_self = self.self_weak.borrow().clone();
        let notify_uri = uri.to_string();
        let initial = self.observe(
            uri,
            Box::new(move |value: &Value| {
                if let Some(ctx) = weak_self.upgrade() {
                    ctx.push_update(&notify_uri, value.clone());
                }
            }),
        )?;
        self.push_update(uri, initial);
        Ok(())
    }

    /// Inserts or replaces the pending update for `uri`, moving it to the
    /// tail of the coalescing buffer, and wakes the write side.
    fn push_update(&self, uri: &str, value: Value) {
        let mut pending = self.pending.borrow_mut();
        pending.shift_remove(uri);
        pending.insert(uri.to_string(), (value, Utc::now()));
        drop(pending);
        self.notify.notify_one();
    }

    /// Drains pending updates head-to-tail into notification lines until
    /// either the buffer is empty or the batch hits [`MAX_BATCH_BYTES`].
    /// If updates remain, re-arms the notifier so the connection loop
    /// keeps draining without waiting on a fresh external push.
    fn drain_batch(&self) -> String {
        let mut out = String::new();
        let mut pending = self.pending.borrow_mut();
        while let Some((uri, (value, timestamp))) = pending.shift_remove_index(0) {
            out.push_str(&format!(
                "({} '{} {})\n",
                timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                uri,
                encode_value(&value)
            ));
            if out.len() >= MAX_BATCH_BYTES {
                break;
            }
        }
        if !pending.is_empty() {
            self.notify.notify_one();
        }
        out
    }
}

impl ClientContextBase for PubSubContext {
    fn common(&self) -> &ContextCommon {
        &self.common
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use decof_core::{Node, Parameter};

    fn fixture() -> (Rc<ObjectDictionary>, Parameter<i64>) {
        let dict = ObjectDictionary::new("test");
        let scalars = Node::new("scalars");
        dict.root().add_child(scalars.as_dyn()).unwrap();
        let p = Parameter::managed_rw("counter", Userlevel::Normal, Userlevel::Normal, 0i64, None);
        scalars.add_child(p.as_dyn()).unwrap();
        (dict, p)
    }

    #[test]
    fn subscribe_emits_initial_value_then_coalesces_updates() {
        let (dict, p) = fixture();
        let ctx = PubSubContext::new(dict);
        ctx.handle_command("subscribe test:scalars:counter\n").unwrap();
        assert_eq!(ctx.pending.borrow().len(), 1);

        p.set(1);
        p.set(2);
        p.set(3);
        assert_eq!(ctx.pending.borrow().len(), 1);
        let (value, _ts) = ctx.pending.borrow().get("test:scalars:counter").cloned().unwrap();
        assert_eq!(value, Value::Int(3));
    }

    #[test]
    fn drain_batch_renders_one_line_per_uri() {
        let (dict, p) = fixture();
        let ctx = PubSubContext::new(dict);
        ctx.handle_command("add test:scalars:counter\n").unwrap();
        p.set(7);
        let rendered = ctx.drain_batch();
        assert!(rendered.starts_with('('));
        assert!(rendered.contains("'test:scalars:counter 7"));
        assert!(rendered.ends_with(")\n"));
        assert!(ctx.pending.borrow().is_empty());
    }

    #[test]
    fn unsubscribe_stops_further_updates() {
        let (dict, p) = fixture();
        let ctx = PubSubContext::new(dict);
        ctx.handle_command("subscribe test:scalars:counter\n").unwrap();
        ctx.drain_batch();
        ctx.handle_command("unsubscribe test:scalars:counter\n").unwrap();
        p.set(99);
        assert!(ctx.pending.borrow().is_empty());
    }

    #[test]
    fn unknown_operation_reports_taxonomy_code_seven() {
        let (dict, _p) = fixture();
        let ctx = PubSubContext::new(dict);
        let err = ctx.handle_command("frobnicate test:scalars:counter\n").unwrap_err();
        assert!(matches!(err, DecofError::UnknownOperation { .. }));
    }
}
