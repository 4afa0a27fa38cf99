//! Validators for this application's entry types and link tags.

use super::{Decision, PackageRequirement, ValidationAction, ValidationRequest, Validator};
use crate::directory::HANDLE_TAG;
use crate::types::{EntryContent, EntryHash, EntryType, LinkAction};

/// Longest accepted handle, in characters.
pub const MAX_HANDLE_CHARS: usize = 64;

/// Validator for `handle` entries.
///
/// A handle is non-empty after trimming, at most [`MAX_HANDLE_CHARS`] long
/// and free of control characters. Only the sole original author of a
/// handle may replace it; only one of its authors may delete it.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandleValidator;

impl HandleValidator {
    fn check_text(text: &str) -> Decision {
        if text.trim().is_empty() {
            return Decision::reject("handle is empty");
        }
        if text.chars().count() > MAX_HANDLE_CHARS {
            return Decision::reject(format!("handle longer than {MAX_HANDLE_CHARS} characters"));
        }
        Decision::require(
            !text.chars().any(char::is_control),
            "handle contains control characters",
        )
    }
}

impl Validator for HandleValidator {
    fn validate(&self, request: &ValidationRequest<'_>) -> Decision {
        let EntryContent::Handle(text) = request.content else {
            return Decision::reject("expected handle content");
        };
        let Some(author) = request.author() else {
            return Decision::reject("no source");
        };

        match request.action {
            ValidationAction::Put => Self::check_text(text),
            ValidationAction::Mod { replaced_sources, .. } => {
                if replaced_sources.as_slice() != std::slice::from_ref(author) {
                    return Decision::reject("only the sole author of a handle may replace it");
                }
                Self::check_text(text)
            }
            ValidationAction::Del { target_sources, .. } => Decision::require(
                target_sources.contains(author),
                "only an author of a handle may delete it",
            ),
        }
    }
}

/// Validator for `toss` entries.
///
/// Both commitments must be well-formed and distinct, the two participants
/// distinct, and the author one of them. Tosses are immutable history, so
/// modifying or deleting one is always rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct TossValidator;

impl Validator for TossValidator {
    fn validate(&self, request: &ValidationRequest<'_>) -> Decision {
        if !matches!(request.action, ValidationAction::Put) {
            return Decision::reject("toss records cannot be modified or deleted");
        }
        let EntryContent::Toss(toss) = request.content else {
            return Decision::reject("expected toss content");
        };
        let Some(author) = request.author() else {
            return Decision::reject("no source");
        };

        if !toss.initiator_seed_hash.is_well_formed() || !toss.responder_seed_hash.is_well_formed() {
            return Decision::reject("malformed seed commitment");
        }
        if toss.initiator_seed_hash == toss.responder_seed_hash {
            return Decision::reject("seed commitments must differ");
        }
        if toss.initiator == toss.responder {
            return Decision::reject("initiator and responder must differ");
        }
        Decision::require(toss.is_participant(author), "author is not a toss participant")
    }
}

/// Validator for bundles tagged [`HANDLE_TAG`].
///
/// A bundle is either a single Add (no prior handle link from this author
/// on that base) or exactly a Del followed by an Add on the same base, where
/// the Del removes a handle link the author currently holds. Every link's
/// base must be the author or the collection root.
#[derive(Debug, Clone)]
pub struct HandleLinksValidator {
    collection_root: EntryHash,
}

impl HandleLinksValidator {
    /// Create a validator that also accepts `collection_root` as a base.
    pub fn new(collection_root: EntryHash) -> Self {
        Self { collection_root }
    }
}

impl Validator for HandleLinksValidator {
    fn package_requirement(&self) -> PackageRequirement {
        PackageRequirement::ChainEntries {
            types: vec![EntryType::Links],
        }
    }

    fn validate(&self, request: &ValidationRequest<'_>) -> Decision {
        if !matches!(request.action, ValidationAction::Put) {
            return Decision::reject("link bundles are append-only");
        }
        let EntryContent::Links(bundle) = request.content else {
            return Decision::reject("expected link bundle");
        };
        let Some(author) = request.author() else {
            return Decision::reject("no source");
        };
        let links = &bundle.links;

        let shape_ok = match links.as_slice() {
            [only] => only.action == LinkAction::Add,
            [first, second] => first.action == LinkAction::Del && second.action == LinkAction::Add,
            _ => false,
        };
        if !shape_ok {
            return Decision::reject("handle links must be one Add, or one Del followed by one Add");
        }

        let base = &links[0].base;
        for link in links {
            if &link.base != base {
                return Decision::reject("all links must share one base");
            }
            if link.tag != HANDLE_TAG {
                return Decision::reject(format!("tag must be {HANDLE_TAG}"));
            }
        }
        if base != author.as_hash() && base != &self.collection_root {
            return Decision::reject("base must be the author or the collection root");
        }

        let held = request.package.authored_links(base, HANDLE_TAG);
        match links.as_slice() {
            [_] => Decision::require(held.is_empty(), "author already holds a handle link; replace it"),
            [del, add] => {
                if !held.contains(&del.target) {
                    return Decision::reject("Del does not remove a handle link the author holds");
                }
                Decision::require(
                    add.target != del.target && !held.contains(&add.target),
                    "Add must introduce a new handle",
                )
            }
            _ => Decision::reject("unreachable bundle shape"),
        }
    }
}
