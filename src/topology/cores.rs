//! CPU core assignment.
//!
//! Origin and edges receive dedicated, contiguous core ranges; clients share
//! whatever is left in round-robin order. Several clients on one core is an
//! accepted oversubscription when scaling out. On a machine too small for the
//! dedicated ranges they wrap around the pool and share cores as well.

use super::types::CoreSet;

/// Hands out dedicated core ranges from a fixed pool
#[derive(Debug, Clone)]
pub struct CoreAllocator {
    total: usize,
    next: usize,
    wrapped: bool,
}

impl CoreAllocator {
    /// `reserved` cores at the bottom of the pool stay with the system
    pub fn new(total: usize, reserved: usize) -> Self {
        Self {
            total,
            next: reserved,
            wrapped: false,
        }
    }

    /// Reserve `count` contiguous cores, wrapping modulo the pool size once
    /// the pool is used up
    pub fn reserve(&mut self, count: usize) -> CoreSet {
        let total = self.total.max(1);
        let end = self.next + count;
        if end > total && !self.wrapped {
            self.wrapped = true;
            log::warn!(
                "{} dedicated cores requested but only {} available; dedicated ranges share cores",
                end,
                total
            );
        }
        let mut cores: Vec<usize> = Vec::with_capacity(count.min(total));
        for core in (self.next..end).map(|c| c % total) {
            if !cores.contains(&core) {
                cores.push(core);
            }
        }
        self.next = end;
        CoreSet::new(cores)
    }

    /// Round-robin source of client cores over the remaining pool.
    ///
    /// When no core is left after the dedicated ranges, clients cycle over
    /// the whole machine instead.
    pub fn into_client_cycle(self) -> ClientCores {
        let pool: Vec<usize> = if self.next < self.total {
            (self.next..self.total).collect()
        } else {
            log::warn!(
                "No cores left for clients after {} dedicated cores; clients share all {} cores",
                self.next,
                self.total
            );
            (0..self.total.max(1)).collect()
        };
        ClientCores { pool, position: 0 }
    }
}

/// Infinite round-robin over the client core pool
#[derive(Debug, Clone)]
pub struct ClientCores {
    pool: Vec<usize>,
    position: usize,
}

impl Iterator for ClientCores {
    type Item = CoreSet;

    fn next(&mut self) -> Option<CoreSet> {
        let core = self.pool[self.position % self.pool.len()];
        self.position += 1;
        Some(CoreSet::single(core))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedicated_ranges_do_not_overlap() {
        let mut cores = CoreAllocator::new(16, 2);
        let origin = cores.reserve(1);
        let e1 = cores.reserve(2);
        let e2 = cores.reserve(2);

        assert_eq!(origin.cores(), &[2]);
        assert_eq!(e1.cores(), &[3, 4]);
        assert_eq!(e2.cores(), &[5, 6]);
        assert_eq!(e2.to_string(), "5,6");
    }

    #[test]
    fn test_clients_cycle_through_remaining() {
        let mut cores = CoreAllocator::new(6, 2);
        cores.reserve(2);
        let assigned: Vec<String> = cores.into_client_cycle().take(5).map(|c| c.to_string()).collect();
        assert_eq!(assigned, vec!["4", "5", "4", "5", "4"]);
    }

    #[test]
    fn test_reserving_past_the_pool_wraps() {
        let mut cores = CoreAllocator::new(4, 2);
        assert_eq!(cores.reserve(2).cores(), &[2, 3]);
        assert_eq!(cores.reserve(1).cores(), &[0]);
        assert_eq!(cores.reserve(2).cores(), &[1, 2]);
        // A range wider than the pool uses each core once
        assert_eq!(cores.reserve(6).cores(), &[3, 0, 1, 2]);
    }

    #[test]
    fn test_full_pool_falls_back_to_all_cores() {
        let mut cores = CoreAllocator::new(3, 1);
        cores.reserve(2);
        let assigned: Vec<String> = cores.into_client_cycle().take(4).map(|c| c.to_string()).collect();
        assert_eq!(assigned, vec!["0", "1", "2", "0"]);
    }
}
