//! Browse XML renderer for SCGI `GET /browse` (spec §6), ported from
//! `original_source/src/scgi/xml_visitor.cpp`. Implemented as a plain
//! recursive walk over [`ObjectKind`] rather than a revived visitor
//! trait, same as `decof_cli::browse`/`tree` (spec §9 design note).

use std::fmt::Write as _;
use std::rc::Rc;

use decof_core::{ObjectKind, ObjectNode, Userlevel};

fn userlevel_name(level: Userlevel) -> &'static str {
    match level {
        Userlevel::Internal => "internal",
        Userlevel::Service => "service",
        Userlevel::Maintenance => "maintenance",
        Userlevel::Normal => "normal",
        Userlevel::Readonly => "readonly",
        Userlevel::Forbidden => "invalid",
    }
}

fn indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str("  ");
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Renders the full `<system>` document rooted at `root` (spec §6).
pub fn render_browse_xml(root: &Rc<dyn ObjectNode>) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<system name=\"DeCoF server\" version=\"1.0\">\n");
    render_module(root, 1, &mut out);
    out.push_str("</system>\n");
    out
}

fn render_module(root: &Rc<dyn ObjectNode>, depth: usize, out: &mut String) {
    indent(out, depth);
    let _ = writeln!(out, "<module name=\"{}\">", xml_escape(root.name()));
    indent(out, depth + 1);
    out.push_str("<description> </description>\n");

    indent(out, depth + 1);
    out.push_str(
        "<param name=\"ul\" type=\"INTEGER\" mode=\"readonly\"><description> </description></param>\n",
    );
    indent(out, depth + 1);
    out.push_str(
        "<cmd name=\"change-ul\"><description> </description><ret type=\"INTEGER\" />\
<arg name=\"ul\" type=\"INTEGER\" /><arg name=\"passwd\" type=\"STRING\" /></cmd>\n",
    );

    for child in root.children().unwrap_or_default() {
        render_object(&child, depth + 1, out);
    }

    indent(out, depth);
    out.push_str("</module>\n");
}

fn render_object(obj: &Rc<dyn ObjectNode>, depth: usize, out: &mut String) {
    match obj.kind() {
        ObjectKind::Node => render_xtypedef(obj, depth, out),
        ObjectKind::Event => {
            indent(out, depth);
            let _ = writeln!(
                out,
                "<cmd name=\"{}\" execlevel=\"{}\"><description> </description></cmd>",
                xml_escape(obj.name()),
                userlevel_name(obj.write_level())
            );
        }
        ObjectKind::Param(kind) => {
            let readonly = obj.write_level() == Userlevel::Forbidden;
            indent(out, depth);
            let line = format!(
                "<param name=\"{}\" type=\"{}\" mode=\"{}\" readlevel=\"{}\" writelevel=\"{}\"><description> </description></param>\n",
                xml_escape(obj.name()),
                kind.as_tag(),
                if readonly { "readonly" } else { "readwrite" },
                userlevel_name(obj.read_level()),
                userlevel_name(obj.write_level()),
            );
            out.push_str(&line);
        }
    }
}

fn render_xtypedef(node: &Rc<dyn ObjectNode>, depth: usize, out: &mut String) {
    indent(out, depth);
    let _ = writeln!(out, "<xtypedef name=\"{}\">", xml_escape(node.name()));
    indent(out, depth + 1);
    out.push_str("<description> </description>\n");
    for child in node.children().unwrap_or_default() {
        render_object(&child, depth + 1, out);
    }
    indent(out, depth);
    out.push_str("</xtypedef>\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use decof_core::{Node, ObjectDictionary, Parameter};

    #[test]
    fn renders_module_with_nested_xtypedef_and_param() {
        let dict = ObjectDictionary::new("root");
        let sub = Node::new("sub");
        dict.root().add_child(sub.as_dyn()).unwrap();
        let p = Parameter::managed_ro("leaf", Userlevel::Normal, 7i64);
        sub.add_child(p.as_dyn()).unwrap();

        let xml = render_browse_xml(&dict.root().as_dyn());
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<module name=\"root\">"));
        assert!(xml.contains("<xtypedef name=\"sub\">"));
        assert!(xml.contains("<param name=\"leaf\" type=\"INTEGER\" mode=\"readonly\">"));
        assert!(xml.ends_with("</system>\n"));
    }
}
