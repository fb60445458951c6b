use super::LocaleChain;
use crate::record::LocalizedEntry;

/// Pick the winning entry for one record under the given chain
///
/// Single pass with a running best: an entry qualifies when its tag is in the
/// acceptable set; among qualifiers the strictly greatest level wins. Equal
/// levels keep the earlier entry, so the result depends on backend row order
/// only when two equally specific entries both qualify — deterministic per
/// run, not contracted further.
///
/// Returns `None` when nothing qualifies, which is "no value for this
/// locale", never "record does not exist".
pub fn select_entry<'a>(
    entries: &'a [LocalizedEntry],
    chain: &LocaleChain,
) -> Option<&'a LocalizedEntry> {
    let mut best: Option<&LocalizedEntry> = None;

    for entry in entries {
        if !chain.accepts(&entry.tag) {
            continue;
        }
        match best {
            Some(current) if entry.level <= current.level => {}
            _ => best = Some(entry),
        }
    }

    best
}
