//! Rendering a core without running it.
//!
//! Around handlers and shadowed primaries nest: each level adds one `| `
//! of indentation between the handler's `>>` entry and `<<` exit lines.

use std::fmt::Write as _;

use crate::dispatch::context::HandlerLink;
use crate::engine::Engine;
use crate::error::DispatchResult;
use crate::handler::Qualifier;

impl Engine {
    /// Describes the order in which `message` would run for instances of
    /// `class`.
    pub fn preview_send(&mut self, class: &str, message: &str) -> DispatchResult<String> {
        let class = self.class_named(class)?;
        let message = self.symbols.intern(message);
        let chains = self.find_applicable_handlers(class, message);
        let core = self.join_handler_links(chains, message, class)?;

        let mut out = String::new();
        self.display_core(core.links(), 0, &mut out);
        self.release_links(core.links());
        Ok(out)
    }

    /// Handlers of `class` in `(message, qualifier)` order.
    pub fn list_handlers(&self, class: &str) -> DispatchResult<Vec<String>> {
        let class = self.class_named(class)?;
        Ok(self
            .classes
            .class(class)
            .handlers()
            .sorted()
            .map(|(index, _)| self.handler_label(crate::handler::HandlerRef { class, index }))
            .collect())
    }

    fn display_core(&self, links: &[HandlerLink], depth: usize, out: &mut String) {
        let Some(first) = links.first() else {
            return;
        };
        if first.qualifier == Qualifier::Around {
            self.preview_line(out, depth, ">>", first);
            self.display_core(&links[1..], depth + 1, out);
            self.preview_line(out, depth, "<<", first);
            return;
        }

        let mut rest = links;
        while let Some((link, tail)) = rest.split_first().filter(|(l, _)| l.qualifier == Qualifier::Before) {
            self.preview_line(out, depth, ">>", link);
            self.preview_line(out, depth, "<<", link);
            rest = tail;
        }
        if rest.first().is_some_and(|l| l.qualifier == Qualifier::Primary) {
            rest = self.display_primaries(rest, depth, out);
        }
        while let Some((link, tail)) = rest.split_first().filter(|(l, _)| l.qualifier == Qualifier::After) {
            self.preview_line(out, depth, ">>", link);
            self.preview_line(out, depth, "<<", link);
            rest = tail;
        }
    }

    /// Shows a primary with every primary it shadows nested inside it and
    /// returns the links after the primary run.
    fn display_primaries<'a>(&self, links: &'a [HandlerLink], depth: usize, out: &mut String) -> &'a [HandlerLink] {
        let (link, tail) = (&links[0], &links[1..]);
        self.preview_line(out, depth, ">>", link);
        let rest = if tail.first().is_some_and(|l| l.qualifier == Qualifier::Primary) {
            self.display_primaries(tail, depth + 1, out)
        } else {
            tail
        };
        self.preview_line(out, depth, "<<", link);
        rest
    }

    fn preview_line(&self, out: &mut String, depth: usize, marker: &str, link: &HandlerLink) {
        let _ = writeln!(
            out,
            "{}{} {}",
            "| ".repeat(depth),
            marker,
            self.handler_label(link.handler)
        );
    }
}
