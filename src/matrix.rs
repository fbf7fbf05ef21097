use serde::Serialize;

/// Mean one-way latency between two cores, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PairLatency {
    pub first: usize,
    pub second: usize,
    pub mean_ns: f64,
}

/// Running sum of trial latencies for one pair.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanAccumulator {
    sum: f64,
    count: usize,
}

impl MeanAccumulator {
    pub fn add(&mut self, latency_ns: f64) {
        self.sum += latency_ns;
        self.count += 1;
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Square table of mean latencies indexed by `(first, second)`. The diagonal stays empty.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencyMatrix {
    size: usize,
    cells: Vec<Option<f64>>,
}

impl LatencyMatrix {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            cells: vec![None; size * size],
        }
    }

    /// Store the mean for `(first, second)`. Diagonal cells are ignored.
    pub fn set(&mut self, first: usize, second: usize, mean_ns: f64) {
        assert!(first < self.size && second < self.size);
        if first == second {
            warn!("Ignoring latency for diagonal cell ({}, {})", first, second);
            return;
        }
        self.cells[first * self.size + second] = Some(mean_ns);
    }

    pub fn get(&self, first: usize, second: usize) -> Option<f64> {
        if first >= self.size || second >= self.size {
            return None;
        }
        self.cells[first * self.size + second]
    }

    /// Populated cells in row-major order, which is the sweep order.
    pub fn entries(&self) -> impl Iterator<Item = PairLatency> + '_ {
        self.cells.iter().enumerate().filter_map(|(idx, cell)| {
            cell.map(|mean_ns| PairLatency {
                first: idx / self.size,
                second: idx % self.size,
                mean_ns,
            })
        })
    }

    pub fn rows(&self) -> Vec<Vec<Option<f64>>> {
        if self.size == 0 {
            return vec![];
        }
        self.cells.chunks(self.size).map(|row| row.to_vec()).collect()
    }
}
