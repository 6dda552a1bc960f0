//! `browse` and `tree` renderers (spec §4.7/§6), ported from the object
//! dictionary's visitor pattern into a plain match over [`ObjectKind`]
//! (spec §9 design note: keep the renderer outside the object model).

use std::rc::Rc;

use decof_core::{ObjectKind, ObjectNode, Userlevel};

use crate::grammar::encode_value;

fn depth(obj: &Rc<dyn ObjectNode>) -> usize {
    let mut d = 0;
    let mut cur = obj.parent();
    while let Some(p) = cur {
        d += 1;
        cur = p.parent();
    }
    d
}

/// Indented `name = value` (or bare `name`/`:name` for nodes) subtree
/// listing, matching `browse_visitor.cpp`.
pub fn render_browse(root: &Rc<dyn ObjectNode>, out: &mut String) {
    out.push_str(&"  ".repeat(depth(root)));
    if root.parent().is_some() {
        out.push(':');
    }
    out.push_str(root.name());

    match root.kind() {
        ObjectKind::Node => {
            out.push('\n');
            for child in root.children().unwrap_or_default() {
                render_browse(&child, out);
            }
        }
        _ => {
            if root.readable() {
                if let Ok(v) = root.read() {
                    out.push_str(" = ");
                    out.push_str(&encode_value(&v));
                }
            }
            out.push('\n');
        }
    }
}

/// Flat `<FQN> NODE|EVENT|PARAM [RO|RW] <TYPE>` listing, matching
/// `tree_visitor.cpp`.
pub fn render_tree(root: &Rc<dyn ObjectNode>, sep: char, out: &mut String) {
    let fqn = root.fqn(sep);
    match root.kind() {
        ObjectKind::Node => {
            out.push_str(&fqn);
            out.push_str(" NODE\n");
            for child in root.children().unwrap_or_default() {
                render_tree(&child, sep, out);
            }
        }
        ObjectKind::Event => {
            out.push_str(&fqn);
            out.push_str(" EVENT\n");
        }
        ObjectKind::Param(kind) => {
            let mode = if root.write_level() == Userlevel::Forbidden {
                "RO"
            } else {
                "RW"
            };
            out.push_str(&format!("{fqn} PARAM {mode} {}\n", kind.as_tag()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use decof_core::{Node, ObjectDictionary, Parameter};

    #[test]
    fn browse_lists_nested_nodes_indented() {
        let dict = ObjectDictionary::new("root");
        let sub = Node::new("sub");
        dict.root().add_child(sub.as_dyn()).unwrap();
        let p = Parameter::managed_ro("leaf", Userlevel::Normal, 7i64);
        sub.add_child(p.as_dyn()).unwrap();

        let mut out = String::new();
        render_browse(&dict.root().as_dyn(), &mut out);
        assert_eq!(out, "root\n  :sub\n    :leaf = 7\n");
    }

    #[test]
    fn tree_lists_flat_lines_with_fqn() {
        let dict = ObjectDictionary::new("root");
        let p = Parameter::managed_rw("x", Userlevel::Normal, Userlevel::Normal, 1i64, None);
        dict.root().add_child(p.as_dyn()).unwrap();

        let mut out = String::new();
        render_tree(&dict.root().as_dyn(), ':', &mut out);
        assert_eq!(out, "root NODE\nroot:x PARAM RW INTEGER\n");
    }
}
