//! The `(action, data)` pair emitted by effects.

/// A single result of a `perform` call.
///
/// `action` is carried through so `reduce` can correlate an effect result
/// with the action that produced it. `data` is optional: `None` means the
/// state transition is driven by the action alone.
///
/// # Examples
///
/// ```
/// use unistate_core::Output;
///
/// let loaded: Output<&str, u32> = Output::with_data("load", 42);
/// assert_eq!(loaded.data, Some(42));
///
/// let tick: Output<&str, u32> = Output::empty("tick");
/// assert!(tick.data.is_none());
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Output<A, D> {
    /// The action this output belongs to
    pub action: A,
    /// Optional payload for `reduce`
    pub data: Option<D>,
}

impl<A, D> Output<A, D> {
    /// Create an output from an action and an optional payload
    #[must_use]
    pub const fn new(action: A, data: Option<D>) -> Self {
        Self { action, data }
    }

    /// Create an output carrying a payload
    #[must_use]
    pub const fn with_data(action: A, data: D) -> Self {
        Self {
            action,
            data: Some(data),
        }
    }

    /// Create an output without a payload
    #[must_use]
    pub const fn empty(action: A) -> Self {
        Self { action, data: None }
    }

    /// Split the output into its parts
    #[must_use]
    pub fn into_parts(self) -> (A, Option<D>) {
        (self.action, self.data)
    }
}

impl<A, D> From<(A, Option<D>)> for Output<A, D> {
    fn from((action, data): (A, Option<D>)) -> Self {
        Self { action, data }
    }
}
