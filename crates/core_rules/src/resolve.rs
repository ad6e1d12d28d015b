//! Rule resolution.

use crate::rule::Rule;
use crate::target::TargetWindow;

/// Pick the single rule that applies to `target`.
///
/// Among the applicable rules, the first scoped rule in iteration order wins.
/// When no scoped rule applies, the first applicable rule of any kind is
/// returned, which can only be the global catch-all. Returns `None` only when
/// nothing applies.
///
/// Ties between scoped rules are broken by configuration order: the rule
/// listed first wins, never the most specific or the last one.
pub fn resolve<'a, I>(target: &TargetWindow, rules: I) -> Option<&'a Rule>
where
    I: IntoIterator<Item = &'a Rule>,
{
    let mut fallback = None;

    for rule in rules {
        if !rule.is_applicable(target) {
            continue;
        }
        if !rule.is_catch_all() {
            return Some(rule);
        }
        if fallback.is_none() {
            fallback = Some(rule);
        }
    }

    fallback
}
