//! Optimistic mutations over a keyed collection.
//!
//! A mutation is visible as soon as it is applied. When the remote side
//! answers, it is either confirmed or rolled back. Several mutations of the
//! same key may be outstanding; only the latest one decides what is shown
//! until it settles, and a rollback restores the last confirmed value.

use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation<K, V> {
    pub ticket: u64,
    pub key: K,
    /// `None` removes the key.
    pub target: Option<V>,
}

#[derive(Debug, Clone)]
pub struct Optimistic<K, V> {
    confirmed: BTreeMap<K, V>,
    pending: BTreeMap<K, (u64, Option<V>)>,
    next_ticket: u64,
}

impl<K: Ord + Clone, V: Clone> Default for Optimistic<K, V> {
    fn default() -> Self {
        Optimistic {
            confirmed: BTreeMap::new(),
            pending: BTreeMap::new(),
            next_ticket: 0,
        }
    }
}

impl<K: Ord + Clone, V: Clone> Optimistic<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value as currently shown, pending mutations included.
    pub fn get(&self, key: &K) -> Option<&V> {
        match self.pending.get(key) {
            Some((_, target)) => target.as_ref(),
            None => self.confirmed.get(key),
        }
    }

    pub fn confirmed(&self, key: &K) -> Option<&V> {
        self.confirmed.get(key)
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.pending.contains_key(key)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn apply(&mut self, key: K, target: Option<V>) -> Mutation<K, V> {
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.pending.insert(key.clone(), (ticket, target.clone()));
        Mutation {
            ticket,
            key,
            target,
        }
    }

    /// Records the remote outcome. A later mutation of the same key stays visible.
    pub fn confirm(&mut self, mutation: &Mutation<K, V>) {
        match &mutation.target {
            Some(value) => {
                self.confirmed.insert(mutation.key.clone(), value.clone());
            }
            None => {
                self.confirmed.remove(&mutation.key);
            }
        }
        self.clear_if_latest(mutation);
    }

    /// Drops the mutation. Returns whether the visible value changed back.
    pub fn rollback(&mut self, mutation: &Mutation<K, V>) -> bool {
        self.clear_if_latest(mutation)
    }

    /// Confirms or rolls back depending on the remote result.
    pub fn settle<T, E>(&mut self, mutation: &Mutation<K, V>, outcome: &Result<T, E>) {
        match outcome {
            Ok(_) => self.confirm(mutation),
            Err(_) => {
                self.rollback(mutation);
            }
        }
    }

    fn clear_if_latest(&mut self, mutation: &Mutation<K, V>) -> bool {
        match self.pending.get(&mutation.key) {
            Some((ticket, _)) if *ticket == mutation.ticket => {
                self.pending.remove(&mutation.key);
                true
            }
            _ => false,
        }
    }

    /// Replaces the confirmed contents and forgets pending mutations.
    pub fn reset(&mut self, confirmed: impl IntoIterator<Item = (K, V)>) {
        self.confirmed = confirmed.into_iter().collect();
        self.pending.clear();
    }

    /// Keys as currently shown, in key order.
    pub fn keys(&self) -> Vec<K> {
        let mut keys: Vec<K> = self
            .confirmed
            .keys()
            .filter(|k| !self.pending.contains_key(*k))
            .cloned()
            .collect();
        keys.extend(
            self.pending
                .iter()
                .filter(|(_, (_, target))| target.is_some())
                .map(|(k, _)| k.clone()),
        );
        keys.sort();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applied_value_is_visible_before_confirmation() {
        let mut set: Optimistic<&str, ()> = Optimistic::new();
        let m = set.apply("a1", Some(()));
        assert!(set.get(&"a1").is_some());
        assert!(set.confirmed(&"a1").is_none());
        set.confirm(&m);
        assert!(set.confirmed(&"a1").is_some());
        assert!(!set.is_pending(&"a1"));
    }

    #[test]
    fn rollback_restores_confirmed_value() {
        let mut set: Optimistic<&str, ()> = Optimistic::new();
        set.reset([("a1", ())]);
        let m = set.apply("a1", None);
        assert!(set.get(&"a1").is_none());
        assert!(set.rollback(&m));
        assert!(set.get(&"a1").is_some());
    }

    #[test]
    fn stale_outcomes_do_not_hide_newer_mutation() {
        let mut set: Optimistic<&str, ()> = Optimistic::new();
        let add = set.apply("a1", Some(()));
        let remove = set.apply("a1", None);

        set.confirm(&add);
        assert!(set.get(&"a1").is_none(), "pending removal still shown");
        assert!(set.confirmed(&"a1").is_some());

        set.rollback(&remove);
        assert!(set.get(&"a1").is_some(), "back to last confirmed state");
    }

    #[test]
    fn both_failing_restores_original() {
        let mut set: Optimistic<&str, ()> = Optimistic::new();
        let add = set.apply("a1", Some(()));
        let remove = set.apply("a1", None);
        assert!(!set.rollback(&add));
        assert!(set.rollback(&remove));
        assert!(set.get(&"a1").is_none());
        assert!(!set.has_pending());
    }

    #[test]
    fn keys_merge_confirmed_and_pending() {
        let mut set: Optimistic<i32, ()> = Optimistic::new();
        set.reset([(1, ()), (2, ())]);
        set.apply(2, None);
        set.apply(3, Some(()));
        assert_eq!(set.keys(), vec![1, 3]);
        let result: Result<(), ()> = Ok(());
        let m = set.apply(4, Some(()));
        set.settle(&m, &result);
        assert_eq!(set.keys(), vec![1, 3, 4]);
    }
}
