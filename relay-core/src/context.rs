use crate::object::Destination;
use tracing::Span;

/// Log-correlation span entered by every public consumer operation.
pub(crate) fn consumer_span(destination: &Destination) -> Span {
    tracing::info_span!(
        "consumer",
        destination = %destination.name,
        kind = %destination.kind
    )
}
