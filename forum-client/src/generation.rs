/// Token identifying one fetch. Responses carrying a stale token must be dropped.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Generation(u64);

#[derive(Debug, Default)]
pub struct GenerationCounter {
    current: u64,
}

impl GenerationCounter {
    pub fn new() -> GenerationCounter {
        GenerationCounter { current: 0 }
    }

    /// Starts a new fetch, making every previously handed-out token stale
    pub fn begin(&mut self) -> Generation {
        self.current += 1;
        Generation(self.current)
    }

    /// Token for work that must not outlive the current generation, without starting a new one
    pub fn current(&self) -> Generation {
        Generation(self.current)
    }

    /// Makes every handed-out token stale, eg. when the view is left
    pub fn invalidate(&mut self) {
        self.current += 1;
    }

    pub fn is_current(&self, g: Generation) -> bool {
        g.0 == self.current
    }
}
