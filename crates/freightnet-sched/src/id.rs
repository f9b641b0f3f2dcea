use slotmap::new_key_type;

new_key_type! {
    /// Identifies a component waiting in the scheduler's pending queue.
    ///
    /// Generational: a component re-queued after its job is joined gets a
    /// fresh key, so a recycled ID can never be double-scheduled.
    pub struct ComponentId;

    /// Identifies an in-flight recomputation job.
    pub struct JobId;

    /// Identifies a job group (one worker thread's batch of jobs).
    pub struct GroupId;
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    #[test]
    fn reinserted_keys_differ() {
        let mut sm: SlotMap<ComponentId, u32> = SlotMap::with_key();
        let first = sm.insert(1);
        sm.remove(first);
        let second = sm.insert(1);
        assert_ne!(first, second);
        assert!(!sm.contains_key(first));
    }
}
