//! Operation parameters shared by every engine.
//!
//! Each structural operation takes a small options struct instead of a long
//! positional argument list. The recognized knobs:
//!
//! - `position`: where an insertion or removal happens relative to a cursor
//!   (or to the collection ends when no cursor is supplied).
//! - `remote`: leave the caller's cursor where it is instead of repositioning
//!   it onto the inserted element.
//! - `free`: destroy the removed element instead of handing it back
//!   ("detach").
//! - `duplicate` on replace: deep-copy the replacement instead of adopting it.

/// Position of an operation relative to a cursor.
///
/// `Undefined` means "no preference": insertions go to the natural end,
/// removals act on the cursor's own element. `Exact` is produced by sorted
/// searches on a hit and accepted wherever a cursor position is meant
/// literally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RelativePosition {
    #[default]
    Undefined,
    Before,
    Exact,
    After,
}

/// Parameters for `add`-family operations.
#[derive(Clone, Copy, Debug, Default)]
pub struct AddOptions {
    pub position: RelativePosition,
    /// Leave the supplied cursor alone instead of moving it onto the new
    /// element.
    pub remote: bool,
}

impl AddOptions {
    pub fn new() -> AddOptions {
        AddOptions::default()
    }

    pub fn before(mut self) -> AddOptions {
        self.position = RelativePosition::Before;
        self
    }

    pub fn after(mut self) -> AddOptions {
        self.position = RelativePosition::After;
        self
    }

    pub fn at(mut self, position: RelativePosition) -> AddOptions {
        self.position = position;
        self
    }

    pub fn remote(mut self) -> AddOptions {
        self.remote = true;
        self
    }
}

/// Parameters for `remove`-family operations.
#[derive(Clone, Copy, Debug)]
pub struct RemoveOptions {
    pub position: RelativePosition,
    /// Destroy the removed element (`true`, the default) or detach it and
    /// hand it back to the caller (`false`).
    pub free: bool,
}

impl Default for RemoveOptions {
    fn default() -> RemoveOptions {
        RemoveOptions {
            position: RelativePosition::Undefined,
            free: true,
        }
    }
}

impl RemoveOptions {
    pub fn new() -> RemoveOptions {
        RemoveOptions::default()
    }

    pub fn before(mut self) -> RemoveOptions {
        self.position = RelativePosition::Before;
        self
    }

    pub fn after(mut self) -> RemoveOptions {
        self.position = RelativePosition::After;
        self
    }

    /// Detach instead of destroying: the removed element is returned.
    pub fn detach(mut self) -> RemoveOptions {
        self.free = false;
        self
    }
}

/// Parameters for `replace`.
#[derive(Clone, Copy, Debug)]
pub struct ReplaceOptions {
    /// Destroy the replaced element (`true`) or return it (`false`).
    pub free: bool,
}

impl Default for ReplaceOptions {
    fn default() -> ReplaceOptions {
        ReplaceOptions { free: true }
    }
}

impl ReplaceOptions {
    pub fn new() -> ReplaceOptions {
        ReplaceOptions::default()
    }

    pub fn detach(mut self) -> ReplaceOptions {
        self.free = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let add = AddOptions::new();
        assert_eq!(add.position, RelativePosition::Undefined);
        assert!(!add.remote);

        let remove = RemoveOptions::new();
        assert!(remove.free);
        assert!(!remove.detach().free);
    }

    #[test]
    fn chained_setters() {
        let add = AddOptions::new().before().remote();
        assert_eq!(add.position, RelativePosition::Before);
        assert!(add.remote);
    }
}
