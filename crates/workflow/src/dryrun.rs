//! Structural dump of a workflow without running it.

use std::fmt::Write;

use crate::action::Action;

const INDENT: &str = "  ";

/// Render the workflow tree as an indented, multi-line string.
///
/// Groups open a block with one child per line; decorators wrap their child
/// inline and append their options.
pub fn dry_run(act: &Action) -> String {
    let mut out = String::new();
    render(act, "", &mut out);
    out
}

fn render(act: &Action, indent: &str, out: &mut String) {
    match act {
        Action::Nop | Action::Leaf(_) => out.push_str(&act.describe()),
        Action::Sequential(seq) => render_group("Sequential", seq.children(), indent, out),
        Action::Join(join) => render_group(join.name(), join.children(), indent, out),
        Action::Parallel(p) => render_decorator("Parallel", p.inner(), "", indent, out),
        Action::Timeout(t) => {
            let opts = format!(", timeout={:?}", t.timeout());
            render_decorator("Timeout", t.inner(), &opts, indent, out);
        }
        Action::Retry(r) => {
            let mut opts = format!(", limit={}", r.limit());
            if let Some(interval) = r.interval() {
                let _ = write!(opts, ", interval={interval:?}");
            }
            render_decorator("Retry", r.inner(), &opts, indent, out);
        }
        Action::Shared(s) => render_decorator("Shared", s.inner(), "", indent, out),
    }
}

fn render_group(name: &str, children: &[Action], indent: &str, out: &mut String) {
    let nested = format!("{indent}{INDENT}");
    out.push_str(name);
    out.push_str("(\n");
    for child in children {
        out.push_str(&nested);
        render(child, &nested, out);
        out.push('\n');
    }
    out.push_str(indent);
    out.push(')');
}

fn render_decorator(name: &str, inner: &Action, opts: &str, indent: &str, out: &mut String) {
    out.push_str(name);
    out.push('(');
    render(inner, indent, out);
    out.push_str(opts);
    out.push(')');
}
