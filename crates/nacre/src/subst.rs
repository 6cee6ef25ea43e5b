//! Scoped substitution from type variables to monotypes.
//!
//! Scopes form a stack: lookups fall through to outer scopes, writes go to
//! the innermost one. A scope opened for a speculative unification is either
//! merged into its parent (committing the links) or popped (rolling them
//! back); this is what the application-retry logic in inference relies on.

use ahash::AHashMap;

use crate::types::{Mono, TypeStore, VarId};

#[derive(Debug)]
pub struct Subst {
    scopes: Vec<AHashMap<VarId, Mono>>,
}

impl Subst {
    pub fn new() -> Self {
        Self {
            scopes: vec![AHashMap::new()],
        }
    }

    /// The monotype a variable is directly linked to, if any.
    pub fn find(&self, var: VarId) -> Option<Mono> {
        self.scopes.iter().rev().find_map(|scope| scope.get(&var)).copied()
    }

    /// Links a variable to a monotype in the innermost scope.
    ///
    /// Linking a variable to itself is a no-op. A variable is linked at most
    /// once per scope: unification always resolves before linking.
    pub fn link(&mut self, var: VarId, to: Mono) {
        if to == Mono::Var(var) {
            return;
        }
        let previous = self
            .scopes
            .last_mut()
            .expect("substitution always has a root scope")
            .insert(var, to);
        debug_assert!(previous.is_none(), "variable linked twice in one scope");
    }

    /// Opens a speculation scope.
    pub fn push_scope(&mut self) {
        self.scopes.push(AHashMap::new());
    }

    /// Discards the innermost scope and all links made in it.
    pub fn pop_scope(&mut self) {
        assert!(self.scopes.len() > 1, "cannot pop the root substitution scope");
        self.scopes.pop();
    }

    /// Commits the innermost scope by transferring its links to the parent.
    pub fn merge_scope(&mut self) {
        assert!(self.scopes.len() > 1, "cannot merge the root substitution scope");
        let links = self.scopes.pop().expect("scope stack is non-empty");
        let parent = self.scopes.last_mut().expect("parent scope exists after pop");
        for (var, to) in links {
            parent.insert(var, to);
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Fully resolves a monotype: every linked variable is replaced by the
    /// image of its link, recursively (zonking).
    pub fn substitute(&self, store: &mut TypeStore, t: Mono) -> Mono {
        match t {
            Mono::Cst(_) => t,
            Mono::Var(var) => match self.find(var) {
                Some(image) => self.substitute(store, image),
                None => t,
            },
            Mono::App(id) => {
                let (ctor, arg) = store.app_parts(id);
                let ctor_sub = self.substitute(store, ctor);
                let arg_sub = self.substitute(store, arg);
                if ctor_sub == ctor && arg_sub == arg {
                    t
                } else {
                    store
                        .app(ctor_sub, arg_sub)
                        .expect("substitution preserves kinds")
                }
            }
        }
    }
}

impl Default for Subst {
    fn default() -> Self {
        Self::new()
    }
}
