/// Classification for retry policy.
///
/// Used by a fetcher's retry loop to decide whether another attempt against
/// the same source can succeed.
///
/// | Class | Retry same source? |
/// |-------|--------------------|
/// | `Never` | No |
/// | `WithBackoff` | Yes, after an exponential backoff delay |
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryClass {
    /// Never retry - the response was unusable or the request can't be served.
    /// Sending it again will produce the same outcome.
    Never,

    /// Transient failure (network trouble, throttling by the vendor).
    /// Wait, then try again until the policy's attempt budget runs out.
    WithBackoff,
}
