/// Caller-facing watch flags, applied in the order given
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchOption {
    /// Deliver headers only, no values
    MetaOnly,
    /// Suppress delete and purge entries
    IgnoreDelete,
    /// Skip replay, only deliver writes made after the watch starts
    UpdatesOnly,
    /// Replay every historical revision, not just the latest per key
    IncludeHistory,
}

/// Where the consumer starts reading the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliverPolicy {
    All,
    #[default]
    LastPerSubject,
    New,
    ByStartSequence(u64),
}

impl DeliverPolicy {
    pub fn start_sequence(&self) -> Option<u64> {
        match self {
            DeliverPolicy::ByStartSequence(seq) => Some(*seq),
            _ => None,
        }
    }
}

/// Effective consumer settings for one watch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedWatch {
    pub headers_only: bool,
    pub include_deletes: bool,
    pub deliver_policy: DeliverPolicy,
    /// Nothing will be replayed, so end-of-data is due before subscribing
    pub end_of_data_at_start: bool,
}

impl Default for ResolvedWatch {
    fn default() -> Self {
        Self {
            headers_only: false,
            include_deletes: true,
            deliver_policy: DeliverPolicy::LastPerSubject,
            end_of_data_at_start: false,
        }
    }
}

/// Folds `options` over the defaults, then applies `from_revision`.
///
/// A positive `from_revision` wins over any policy the flags picked; end-of-data
/// then waits for the replay from that revision.
pub fn resolve_watch_options(
    options: &[WatchOption],
    from_revision: u64,
) -> ResolvedWatch {
    let mut resolved = ResolvedWatch::default();
    for option in options {
        match option {
            WatchOption::MetaOnly => resolved.headers_only = true,
            WatchOption::IgnoreDelete => resolved.include_deletes = false,
            WatchOption::UpdatesOnly => resolved.deliver_policy = DeliverPolicy::New,
            WatchOption::IncludeHistory => resolved.deliver_policy = DeliverPolicy::All,
        }
    }

    if from_revision > 0 {
        resolved.deliver_policy = DeliverPolicy::ByStartSequence(from_revision);
    }
    resolved.end_of_data_at_start = resolved.deliver_policy == DeliverPolicy::New;
    resolved
}
