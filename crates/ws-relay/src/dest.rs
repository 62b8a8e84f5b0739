use thiserror::Error;
use url::Url;

/// The transport scheme the relay can open outbound sessions over.
const SUPPORTED_SCHEME: &str = "ws";

/// Secure-transport scheme the relay recognizes but cannot terminate.
const SECURE_SCHEME: &str = "wss";

/// Why a resolved destination URL was refused. Validation runs before any
/// connection attempt, so a bad URL never costs a dial.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DestinationRejection {
    #[error("destination url [{url}] is not a valid url")]
    Malformed { url: String },

    #[error("destination url [{url}] uses secure scheme 'wss' which this relay cannot terminate")]
    SecureUnsupported { url: String },

    #[error("destination url [{url}] has unrecognized scheme '{scheme}'")]
    UnrecognizedScheme { url: String, scheme: String },
}

/// Validate that `destination` is a URL the relay can forward to.
///
/// Applies to both client-supplied and preconfigured forced destinations.
pub fn validate_destination(destination: &str) -> Result<(), DestinationRejection> {
    let parsed = match Url::parse(destination) {
        Ok(parsed) => parsed,
        Err(_) => {
            return Err(DestinationRejection::Malformed {
                url: destination.to_string(),
            })
        }
    };

    match parsed.scheme() {
        SUPPORTED_SCHEME => Ok(()),
        SECURE_SCHEME => Err(DestinationRejection::SecureUnsupported {
            url: destination.to_string(),
        }),
        other => Err(DestinationRejection::UnrecognizedScheme {
            url: destination.to_string(),
            scheme: other.to_string(),
        }),
    }
}
