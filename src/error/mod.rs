use rocket::{
    http::Status,
    response::{status::Custom, Responder},
    serde::json::{serde_json::Error as JsonError, Json},
    Request,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{model::chain::LedgerError, overlay::OverlayError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("User not logged in")]
    NotLoggedIn,
    #[error("Need admin level")]
    NeedAdmin,
    #[error("Need to be creator")]
    NeedCreator,
    #[error("User not part of election")]
    NotPart,
    #[error("Invalid election state")]
    InvalidState,
    #[error("DKG timeout")]
    DkgTimeout,
    #[error("Shuffle timeout")]
    ShuffleTimeout,
    #[error("Decrypt timeout")]
    DecryptTimeout,
    #[error("Wrong pin")]
    WrongPin,
    #[error("No shared secret held for election {0}")]
    MissingSecret(String),
    #[error("Protocol {0} aborted before completion")]
    ProtocolAborted(&'static str),
    #[error("Ballot {0} does not decrypt to a valid choice")]
    Undecryptable(usize),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Overlay(#[from] OverlayError),
    #[error(transparent)]
    Marshal(#[from] JsonError),
}

impl Error {
    /// Stable name of the failure, so that clients can branch on the cause.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotLoggedIn => "NOT_LOGGED_IN",
            Self::NeedAdmin => "NEED_ADMIN",
            Self::NeedCreator => "NEED_CREATOR",
            Self::NotPart => "NOT_PART",
            Self::InvalidState => "INVALID_STATE",
            Self::DkgTimeout => "DKG_TIMEOUT",
            Self::ShuffleTimeout => "SHUFFLE_TIMEOUT",
            Self::DecryptTimeout => "DECRYPT_TIMEOUT",
            Self::WrongPin => "WRONG_PIN",
            Self::MissingSecret(_) => "MISSING_SECRET",
            Self::ProtocolAborted(_) => "PROTOCOL_ABORTED",
            Self::Undecryptable(_) => "UNDECRYPTABLE",
            Self::Ledger(_) => "LEDGER",
            Self::Overlay(_) => "OVERLAY",
            Self::Marshal(_) => "MARSHAL",
        }
    }

    /// HTTP status this error is reported with.
    pub fn status(&self) -> Status {
        match self {
            Self::NotLoggedIn | Self::WrongPin => Status::Unauthorized,
            Self::NeedAdmin | Self::NeedCreator | Self::NotPart => Status::Forbidden,
            Self::InvalidState => Status::Conflict,
            Self::DkgTimeout | Self::ShuffleTimeout | Self::DecryptTimeout => {
                Status::GatewayTimeout
            }
            Self::Ledger(LedgerError::UnknownLedger(_)) => Status::NotFound,
            Self::Ledger(LedgerError::Rejected(_)) => Status::UnprocessableEntity,
            Self::Ledger(_)
            | Self::Overlay(_)
            | Self::Marshal(_)
            | Self::MissingSecret(_)
            | Self::ProtocolAborted(_)
            | Self::Undecryptable(_) => Status::InternalServerError,
        }
    }
}

/// JSON body sent alongside every error status.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        Self {
            error: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        if status.class().is_server_error() {
            error!("{self}");
        } else {
            debug!("Rejecting request: {self}");
        }
        Custom(status, Json(ErrorBody::from(&self))).respond_to(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::id::LedgerId;

    #[test]
    fn codes_are_distinct_per_taxonomy_entry() {
        let errors = [
            Error::NotLoggedIn,
            Error::NeedAdmin,
            Error::NeedCreator,
            Error::NotPart,
            Error::InvalidState,
            Error::DkgTimeout,
            Error::ShuffleTimeout,
            Error::DecryptTimeout,
            Error::WrongPin,
        ];
        let mut codes: Vec<_> = errors.iter().map(Error::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn collaborator_errors_keep_their_message() {
        let id = LedgerId::from([7; 32]);
        let err: Error = LedgerError::UnknownLedger(id).into();
        assert_eq!(err.code(), "LEDGER");
        assert_eq!(err.status(), Status::NotFound);
        assert_eq!(err.to_string(), LedgerError::UnknownLedger(id).to_string());
    }

    #[test]
    fn timeouts_map_to_gateway_timeout() {
        assert_eq!(Error::DkgTimeout.status(), Status::GatewayTimeout);
        assert_eq!(Error::ShuffleTimeout.status(), Status::GatewayTimeout);
        assert_eq!(Error::InvalidState.status(), Status::Conflict);
        assert_eq!(Error::NotLoggedIn.status(), Status::Unauthorized);
    }
}
