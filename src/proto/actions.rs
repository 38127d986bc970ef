//! SOAP action names for the NSI CS 2.0 message pairs.

const SERVICE: &str = "http://schemas.ogf.org/nsi/2013/07/connection/service";

macro_rules! action {
    ($name:ident, $local:literal) => {
        pub const $name: &str = concat!(
            "http://schemas.ogf.org/nsi/2013/07/connection/service/",
            $local
        );
    };
}

action!(RESERVE, "reserve");
action!(RESERVE_CONFIRMED, "reserveConfirmed");
action!(RESERVE_FAILED, "reserveFailed");
action!(RESERVE_COMMIT, "reserveCommit");
action!(RESERVE_COMMIT_CONFIRMED, "reserveCommitConfirmed");
action!(RESERVE_COMMIT_FAILED, "reserveCommitFailed");
action!(RESERVE_ABORT, "reserveAbort");
action!(RESERVE_ABORT_CONFIRMED, "reserveAbortConfirmed");
action!(PROVISION, "provision");
action!(PROVISION_CONFIRMED, "provisionConfirmed");
action!(RELEASE, "release");
action!(RELEASE_CONFIRMED, "releaseConfirmed");
action!(TERMINATE, "terminate");
action!(TERMINATE_CONFIRMED, "terminateConfirmed");
// negative terminate responses carry their own action, distinct from the
// confirmed binding
action!(TERMINATE_FAILED, "terminateFailed");
action!(QUERY_SUMMARY, "querySummary");
action!(QUERY_SUMMARY_CONFIRMED, "querySummaryConfirmed");
action!(QUERY_SUMMARY_FAILED, "querySummaryFailed");

// notifications
action!(ERROR_EVENT, "errorEvent");
action!(DATA_PLANE_STATE_CHANGE, "dataPlaneStateChange");
action!(RESERVE_TIMEOUT, "reserveTimeout");
action!(MESSAGE_DELIVERY_TIMEOUT, "messageDeliveryTimeout");

/// Base URI shared by every action above.
pub fn service_uri() -> &'static str {
    SERVICE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actions_share_the_service_uri() {
        for action in [RESERVE, RESERVE_CONFIRMED, TERMINATE_FAILED, MESSAGE_DELIVERY_TIMEOUT] {
            assert!(action.starts_with(service_uri()));
        }
    }

    #[test]
    fn test_terminate_failed_has_its_own_binding() {
        assert_ne!(TERMINATE_FAILED, TERMINATE_CONFIRMED);
        assert!(TERMINATE_FAILED.ends_with("terminateFailed"));
    }
}
