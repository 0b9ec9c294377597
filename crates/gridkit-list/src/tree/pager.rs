//! Paging window of a node

use serde::Serialize;

/// Number of children matching a node's query.
///
/// Large record sets are only counted up to a limit; past it the count is
/// a lower bound until an exact count is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordCount {
    Exact(usize),
    AtLeast(usize),
}

impl RecordCount {
    pub fn value(&self) -> usize {
        match self {
            Self::Exact(n) | Self::AtLeast(n) => *n,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Exact(_))
    }

    /// Build from a store answer: `None` means counting stopped at the limit
    pub fn from_response(exact: Option<usize>, lower_bound: usize) -> Self {
        match exact {
            Some(n) => Self::Exact(n),
            None => Self::AtLeast(lower_bound),
        }
    }

    fn adjusted(self, delta: isize) -> Self {
        let apply = |n: usize| n.saturating_add_signed(delta);
        match self {
            Self::Exact(n) => Self::Exact(apply(n)),
            Self::AtLeast(n) => Self::AtLeast(apply(n)),
        }
    }
}

impl Default for RecordCount {
    fn default() -> Self {
        Self::Exact(0)
    }
}

/// Where a page jump lands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageJump {
    /// Fetch the window at this offset
    Direct(usize),
    /// The target lies past the estimated count; count exactly first
    NeedsExactCount(usize),
}

/// Offset/limit window over the children of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pager {
    pub offset: usize,
    pub limit: usize,
    pub count: RecordCount,
}

impl Pager {
    pub fn new(limit: usize) -> Self {
        Self {
            offset: 0,
            limit,
            count: RecordCount::default(),
        }
    }

    pub fn total(&self) -> usize {
        self.count.value()
    }

    /// One past the last displayed index
    pub fn page_end(&self) -> usize {
        match self.count {
            RecordCount::Exact(n) => (self.offset + self.limit).min(n),
            RecordCount::AtLeast(_) => self.offset + self.limit,
        }
    }

    pub fn has_previous(&self) -> bool {
        self.offset > 0
    }

    pub fn has_next(&self) -> bool {
        match self.count {
            RecordCount::Exact(n) => self.offset + self.limit < n,
            RecordCount::AtLeast(_) => true,
        }
    }

    pub fn next_offset(&self) -> Option<usize> {
        self.has_next().then_some(self.offset + self.limit)
    }

    pub fn previous_offset(&self) -> Option<usize> {
        self.has_previous()
            .then_some(self.offset.saturating_sub(self.limit))
    }

    /// Resolve a jump to an arbitrary offset
    pub fn jump(&self, offset: usize) -> PageJump {
        match self.count {
            RecordCount::AtLeast(n) if offset >= n => PageJump::NeedsExactCount(offset),
            RecordCount::AtLeast(_) => PageJump::Direct(offset),
            RecordCount::Exact(n) if n == 0 => PageJump::Direct(0),
            RecordCount::Exact(n) if offset >= n => {
                PageJump::Direct((n - 1) / self.limit * self.limit)
            }
            RecordCount::Exact(_) => PageJump::Direct(offset),
        }
    }

    pub(crate) fn adjust_count(&mut self, delta: isize) {
        self.count = self.count.adjusted(delta);
    }

    /// Pager text: `"1-80 / 200"`, or `"1-80 / 10000+"` for estimated counts
    pub fn display(&self) -> String {
        let total = match self.count {
            RecordCount::Exact(n) => n.to_string(),
            RecordCount::AtLeast(n) => format!("{}+", n),
        };
        if self.total() == 0 {
            return format!("0 / {}", total);
        }
        let first = self.offset + 1;
        let last = self.page_end();
        if first == last {
            format!("{} / {}", first, total)
        } else {
            format!("{}-{} / {}", first, last, total)
        }
    }
}
