//! Move-list cursor. `-1` is the initial position; every other value is a
//! valid ply index into the loaded record.

use chess_core::INITIAL_PLY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Next,
    Previous,
    /// Clamped into `[-1, last ply]`.
    JumpTo(isize),
    Start,
    End,
}

/// A cursor change that actually happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: isize,
    pub to: isize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Navigator {
    cursor: isize,
    len: usize,
}

impl Navigator {
    /// A navigator over `len` plies, positioned on the last ply (or the
    /// initial position for an empty game).
    pub fn at_end(len: usize) -> Self {
        Self {
            cursor: len as isize - 1,
            len,
        }
    }

    pub fn cursor(&self) -> isize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn last(&self) -> isize {
        self.len as isize - 1
    }

    pub fn at_start(&self) -> bool {
        self.cursor == INITIAL_PLY
    }

    pub fn at_last(&self) -> bool {
        self.cursor == self.last()
    }

    fn clamp(&self, index: isize) -> isize {
        index.clamp(INITIAL_PLY, self.last())
    }

    /// Move the cursor. Returns `None` when the cursor would not change.
    pub fn apply(&mut self, nav: Navigation) -> Option<Transition> {
        let target = match nav {
            Navigation::Next => self.clamp(self.cursor + 1),
            Navigation::Previous => self.clamp(self.cursor - 1),
            Navigation::JumpTo(k) => self.clamp(k),
            Navigation::Start => INITIAL_PLY,
            Navigation::End => self.last(),
        };

        if target == self.cursor {
            return None;
        }

        let transition = Transition {
            from: self.cursor,
            to: target,
        };
        self.cursor = target;
        Some(transition)
    }

    pub fn next(&mut self) -> Option<Transition> {
        self.apply(Navigation::Next)
    }

    pub fn previous(&mut self) -> Option<Transition> {
        self.apply(Navigation::Previous)
    }

    pub fn jump_to(&mut self, index: isize) -> Option<Transition> {
        self.apply(Navigation::JumpTo(index))
    }
}
