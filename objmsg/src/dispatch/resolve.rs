//! Handler resolution and core linking.
//!
//! Resolution walks the receiver class's precedence list and collects every
//! handler for the message into one chain per qualifier. Around, before and
//! primary handlers are appended, so the most specific class runs first;
//! after handlers are prepended, so the most specific class runs last.
//! Every link taken marks its handler and the handler's class busy until
//! [`Engine::release_links`] gives it back.

use std::collections::VecDeque;

use tracing::trace;

use crate::class::ClassId;
use crate::dispatch::context::{Core, HandlerLink};
use crate::engine::Engine;
use crate::error::{DispatchError, DispatchResult};
use crate::handler::{HandlerRef, Qualifier};
use crate::symbol::Symbol;

/// Applicable handlers split by qualifier, before joining.
#[derive(Debug, Default)]
pub(crate) struct QualifierChains {
    chains: [VecDeque<HandlerLink>; 4],
}

impl QualifierChains {
    fn add(&mut self, link: HandlerLink) {
        let chain = &mut self.chains[link.qualifier.index()];
        match link.qualifier {
            Qualifier::After => chain.push_front(link),
            _ => chain.push_back(link),
        }
    }

    fn has_primary(&self) -> bool {
        !self.chains[Qualifier::Primary.index()].is_empty()
    }

    fn into_links(self) -> Vec<HandlerLink> {
        self.chains.into_iter().flatten().collect()
    }
}

impl Engine {
    /// Collects the handlers of `message` applicable to instances of `class`.
    pub(crate) fn find_applicable_handlers(&mut self, class: ClassId, message: Symbol) -> QualifierChains {
        let mut chains = QualifierChains::default();
        let precedence = self.classes.class(class).all_superclasses.clone();
        for ancestor in precedence {
            self.find_applicable_of_name(ancestor, message, &mut chains);
        }
        chains
    }

    fn find_applicable_of_name(&mut self, class: ClassId, message: Symbol, chains: &mut QualifierChains) {
        let group = self.classes.class(class).handlers.find_name_group(message).to_vec();
        for index in group {
            let handler = HandlerRef { class, index };
            let Some(entry) = self.classes.handler_mut(handler) else {
                continue;
            };
            entry.busy += 1;
            let qualifier = entry.qualifier;
            self.classes.class_mut(class).busy += 1;
            chains.add(HandlerLink { handler, qualifier });
        }
    }

    /// Joins the per-qualifier chains into one core. Without a primary the
    /// partial links are released and nothing is returned.
    pub(crate) fn join_handler_links(
        &mut self,
        chains: QualifierChains,
        message: Symbol,
        class: ClassId,
    ) -> DispatchResult<Core> {
        let has_primary = chains.has_primary();
        let links = chains.into_links();
        if !has_primary {
            self.release_links(&links);
            return Err(DispatchError::NoPrimaryHandler {
                message: self.name(message),
                class: self.class_name(class),
            });
        }
        trace!(
            "linked {} handler(s) for {} on {}",
            links.len(),
            self.symbols.resolve(message),
            self.symbols.resolve(self.classes.class(class).name)
        );
        Ok(Core::new(links))
    }

    /// Gives back the busy marks taken by [`Engine::find_applicable_handlers`].
    pub(crate) fn release_links(&mut self, links: &[HandlerLink]) {
        for link in links {
            if let Some(handler) = self.classes.handler_mut(link.handler) {
                handler.busy = handler.busy.saturating_sub(1);
            }
            let class = self.classes.class_mut(link.handler.class);
            class.busy = class.busy.saturating_sub(1);
        }
    }
}
