use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::value::Value;

pub type ScopeRef = Rc<RefCell<Scope>>;

/// One frame in the scope chain. Closures share (not own) their defining
/// chain: several function values may hold the same parent frames, and a
/// chain lives as long as its longest-lived closure.
///
/// `set` always writes the local frame (shadowing); `get` walks outward.
/// Ancestor hits are memoized per frame and revalidated against a
/// chain-wide per-name revision table, so a later `set` or move of the
/// same name anywhere in the chain invalidates every stale cache entry.
pub struct Scope {
    vars: HashMap<String, Value>,
    parent: Option<ScopeRef>,
    revisions: Rc<RefCell<HashMap<String, u64>>>,
    cache: HashMap<String, CachedSlot>,
}

struct CachedSlot {
    value: Value,
    seen_rev: u64,
}

impl Scope {
    pub fn root() -> ScopeRef {
        Rc::new(RefCell::new(Scope {
            vars: HashMap::new(),
            parent: None,
            revisions: Rc::new(RefCell::new(HashMap::new())),
            cache: HashMap::new(),
        }))
    }

    pub fn child(parent: &ScopeRef) -> ScopeRef {
        let revisions = parent.borrow().revisions.clone();
        Rc::new(RefCell::new(Scope {
            vars: HashMap::new(),
            parent: Some(parent.clone()),
            revisions,
            cache: HashMap::new(),
        }))
    }

    /// Binds `name` in this frame, shadowing any outer binding.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.bump_revision(&name);
        self.cache.remove(&name);
        self.vars.insert(name, value);
    }

    /// Resolves `name` through the chain, memoizing ancestor hits.
    pub fn get(this: &ScopeRef, name: &str) -> Option<Value> {
        {
            let scope = this.borrow();
            if let Some(v) = scope.vars.get(name) {
                return Some(v.clone());
            }
            if let Some(slot) = scope.cache.get(name) {
                if scope.revision_of(name) == slot.seen_rev {
                    return Some(slot.value.clone());
                }
            }
        }

        let mut cur = this.borrow().parent.clone();
        while let Some(frame) = cur {
            let next;
            {
                let b = frame.borrow();
                if let Some(v) = b.vars.get(name) {
                    let value = v.clone();
                    let seen_rev = b.revision_of(name);
                    drop(b);
                    this.borrow_mut().cache.insert(
                        name.to_string(),
                        CachedSlot {
                            value: value.clone(),
                            seen_rev,
                        },
                    );
                    return Some(value);
                }
                next = b.parent.clone();
            }
            cur = next;
        }
        None
    }

    /// Replaces the defining binding of `name` with the `Moved` tombstone.
    /// Returns false when no frame in the chain binds the name.
    pub fn mark_moved(this: &ScopeRef, name: &str) -> bool {
        let mut cur = Some(this.clone());
        while let Some(frame) = cur {
            let mut b = frame.borrow_mut();
            if b.vars.contains_key(name) {
                b.bump_revision(name);
                b.cache.remove(name);
                b.vars.insert(name.to_string(), Value::Moved);
                return true;
            }
            cur = b.parent.clone();
        }
        false
    }

    pub fn has_local(&self, name: &str) -> bool {
        self.vars.contains_key(name)
    }

    fn revision_of(&self, name: &str) -> u64 {
        self.revisions.borrow().get(name).copied().unwrap_or(0)
    }

    fn bump_revision(&self, name: &str) {
        *self
            .revisions
            .borrow_mut()
            .entry(name.to_string())
            .or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_walks_parent_chain() {
        let root = Scope::root();
        root.borrow_mut().set("x", Value::Integer(1));
        let child = Scope::child(&root);
        let grandchild = Scope::child(&child);
        assert_eq!(Scope::get(&grandchild, "x"), Some(Value::Integer(1)));
    }

    #[test]
    fn set_shadows_in_local_frame() {
        let root = Scope::root();
        root.borrow_mut().set("x", Value::Integer(1));
        let child = Scope::child(&root);
        child.borrow_mut().set("x", Value::Integer(2));

        assert_eq!(Scope::get(&child, "x"), Some(Value::Integer(2)));
        assert_eq!(Scope::get(&root, "x"), Some(Value::Integer(1)));
    }

    #[test]
    fn cached_ancestor_lookup_sees_later_set() {
        let root = Scope::root();
        root.borrow_mut().set("x", Value::Integer(1));
        let child = Scope::child(&root);

        // Prime the cache, then change the ancestor binding.
        assert_eq!(Scope::get(&child, "x"), Some(Value::Integer(1)));
        assert_eq!(Scope::get(&child, "x"), Some(Value::Integer(1)));
        root.borrow_mut().set("x", Value::Integer(2));
        assert_eq!(Scope::get(&child, "x"), Some(Value::Integer(2)));
    }

    #[test]
    fn mark_moved_hits_defining_frame() {
        let root = Scope::root();
        root.borrow_mut().set("buf", Value::list(vec![]));
        let child = Scope::child(&root);

        assert!(Scope::mark_moved(&child, "buf"));
        assert!(matches!(Scope::get(&root, "buf"), Some(Value::Moved)));
        assert!(matches!(Scope::get(&child, "buf"), Some(Value::Moved)));
    }

    #[test]
    fn mark_moved_unknown_name_is_false() {
        let root = Scope::root();
        assert!(!Scope::mark_moved(&root, "ghost"));
    }
}
