//! Stateful prefix/delimiter/marker/skip/limit filtering for bucket listings.
//!
//! Mirrors the reference `ListFilter`: `skip` is applied before prefix and
//! delimiter matching is even attempted, which looks backwards at first
//! glance but is intentional: `skip` counts *all* enumerated names, not
//! just the ones that would otherwise have matched.
//!
//! `marker` is stored but plays no part in `check()`, matching the
//! reference `listFilter.Check`: there, marker is dead code too, only ever
//! echoed back into the `<Marker>` response tag by the HTTP layer. Passing
//! it in through the constructor keeps that field available to callers
//! that want it, without letting it perturb `seen`/`skip`/`limit`
//! accounting the way an early return here would.

use std::collections::BTreeSet;

pub struct ListFilter {
    prefix: String,
    delimiter: String,
    #[allow(dead_code)]
    marker: String,
    limit: u64,
    skip: u64,
    seen: u64,
    truncated: bool,
    common_prefixes: BTreeSet<String>,
}

impl ListFilter {
    pub fn new(prefix: &str, delimiter: &str, marker: &str, limit: u64, skip: u64) -> Self {
        Self {
            prefix: prefix.to_string(),
            delimiter: delimiter.to_string(),
            marker: marker.to_string(),
            limit,
            skip,
            seen: 0,
            truncated: false,
            common_prefixes: BTreeSet::new(),
        }
    }

    /// Returns `Ok(true)` if `name` should be included as an object in the
    /// result, `Ok(false)` if it's filtered out (skipped or rolled into a
    /// common prefix), and `Err(())` once the limit has been reached;
    /// callers must stop enumerating immediately.
    pub fn check(&mut self, name: &str) -> Result<bool, ()> {
        let n = self.seen;
        self.seen += 1;
        if n < self.skip {
            return Ok(false);
        }
        if n - self.skip > self.limit {
            self.truncated = true;
            return Err(());
        }

        if self.prefix.is_empty() || name.starts_with(&self.prefix) {
            if !self.delimiter.is_empty() {
                let rest = &name[self.prefix.len()..];
                if let Some(idx) = rest.find(&self.delimiter) {
                    let dir = &rest[..idx];
                    self.common_prefixes.insert(dir.to_string());
                    return Ok(false);
                }
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// Common prefixes gathered so far, in sorted order, plus whether the
    /// listing was truncated at `limit`.
    pub fn result(self) -> (Vec<String>, bool) {
        (self.common_prefixes.into_iter().collect(), self.truncated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(names: &[&str], prefix: &str, delimiter: &str, marker: &str, limit: u64, skip: u64) -> (Vec<String>, Vec<String>, bool) {
        let mut filter = ListFilter::new(prefix, delimiter, marker, limit, skip);
        let mut objects = Vec::new();
        for name in names {
            match filter.check(name) {
                Ok(true) => objects.push(name.to_string()),
                Ok(false) => {}
                Err(()) => break,
            }
        }
        let (prefixes, truncated) = filter.result();
        (objects, prefixes, truncated)
    }

    #[test]
    fn no_prefix_no_delimiter_returns_everything() {
        let (objects, prefixes, truncated) = run(&["a", "b", "c"], "", "", "", 100, 0);
        assert_eq!(objects, vec!["a", "b", "c"]);
        assert!(prefixes.is_empty());
        assert!(!truncated);
    }

    #[test]
    fn prefix_filters_non_matching_names() {
        let (objects, _, _) = run(&["logs/a", "logs/b", "other/c"], "logs/", "", "", 100, 0);
        assert_eq!(objects, vec!["logs/a", "logs/b"]);
    }

    #[test]
    fn delimiter_rolls_up_common_prefixes_sorted() {
        let (objects, prefixes, _) = run(
            &["logs/zeta/x", "logs/alpha/y", "logs/alpha/z", "top.txt"],
            "logs/",
            "/",
            "",
            100,
            0,
        );
        assert!(objects.is_empty());
        assert_eq!(prefixes, vec!["alpha", "zeta"]);
    }

    #[test]
    fn skip_is_applied_before_prefix_matching() {
        // "other" is seen first and consumes the skip budget even though it
        // never would have matched the prefix.
        let (objects, _, _) = run(&["other", "logs/a", "logs/b"], "logs/", "", "", 100, 1);
        assert_eq!(objects, vec!["logs/a", "logs/b"]);

        let (objects, _, _) = run(&["logs/a", "other", "logs/b"], "logs/", "", "", 100, 1);
        assert_eq!(objects, vec!["logs/b"]);
    }

    #[test]
    fn limit_truncates_and_stops_enumeration() {
        let (objects, _, truncated) = run(&["a", "b", "c", "d"], "", "", "", 2, 0);
        assert_eq!(objects, vec!["a", "b", "c"]);
        assert!(truncated);
    }

    #[test]
    fn marker_is_stored_but_does_not_affect_check() {
        // Unlike skip, marker is dead code in `check()` — it's carried only
        // for the HTTP layer's `<Marker>` response tag.
        let (objects, _, _) = run(&["a", "b", "c", "d"], "", "", "b", 100, 0);
        assert_eq!(objects, vec!["a", "b", "c", "d"]);
    }

    proptest::proptest! {
        /// Every name returned in `objects` or rolled into `common_prefixes`
        /// was at some point fed to `check`; the filter never invents one.
        #[test]
        fn never_returns_a_name_it_wasnt_given(names in proptest::collection::vec("[a-z/]{1,12}", 0..20)) {
            let mut filter = ListFilter::new("", "/", "", 1000, 0);
            let mut objects = Vec::new();
            for name in &names {
                if let Ok(true) = filter.check(name) {
                    objects.push(name.clone());
                }
            }
            for o in &objects {
                proptest::prop_assert!(names.contains(o));
            }
        }

        /// Common prefixes, once collected, are always in sorted order —
        /// `result()` hands back a `BTreeSet` drained into a `Vec`.
        #[test]
        fn common_prefixes_are_sorted(names in proptest::collection::vec("[a-z]{1,4}/[a-z]{1,4}", 0..20)) {
            let mut filter = ListFilter::new("", "/", "", 1000, 0);
            for name in &names {
                let _ = filter.check(name);
            }
            let (prefixes, _) = filter.result();
            let mut sorted = prefixes.clone();
            sorted.sort();
            proptest::prop_assert_eq!(prefixes, sorted);
        }
    }
}
