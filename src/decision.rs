//! Skip/update decision for a resolved address.

/// What to do with a freshly resolved address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Update,
    Skip,
}

/// Compare a resolved address with the last one successfully applied.
///
/// `last_applied` is `None` until the first successful update, which makes
/// the first resolution after startup always produce [`Decision::Update`].
pub fn decide(last_applied: Option<&str>, resolved: &str) -> Decision {
    match last_applied {
        Some(last) if normalize(last) == normalize(resolved) => Decision::Skip,
        _ => Decision::Update,
    }
}

/// Normalized form used for comparisons.
pub fn normalize(ip: &str) -> &str {
    ip.trim()
}
