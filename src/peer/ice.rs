use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use webrtc::ice_transport::ice_gathering_state::RTCIceGatheringState;
use webrtc::peer_connection::RTCPeerConnection;

use crate::config::ICE_POLL_INTERVAL;
use crate::logger::log;

/// How the session waits for candidate collection to finish.
///
/// `Poll` re-checks the gathering state on a fixed interval and is the
/// default contract. `Subscribe` rides the peer connection's own
/// gathering-complete notification and resolves as soon as it fires.
#[derive(Clone, Debug)]
pub enum GatherPolicy {
    Poll { interval: Duration },
    Subscribe,
}

impl Default for GatherPolicy {
    fn default() -> Self {
        GatherPolicy::Poll {
            interval: ICE_POLL_INTERVAL,
        }
    }
}

/// Suspend until the connection's ICE gathering state reaches `Complete`.
/// Already-complete state returns immediately under either policy.
pub async fn wait_ice_complete(pc: &Arc<RTCPeerConnection>, policy: &GatherPolicy) {
    match policy {
        GatherPolicy::Poll { interval } => {
            poll_until_complete(|| pc.ice_gathering_state(), *interval).await;
        }
        GatherPolicy::Subscribe => {
            if pc.ice_gathering_state() == RTCIceGatheringState::Complete {
                return;
            }
            let mut done = pc.gathering_complete_promise().await;
            let _ = done.recv().await;
        }
    }
    log("ICE gathering complete");
}

/// The polling contract itself: check first, sleep only while incomplete.
pub(crate) async fn poll_until_complete<F>(probe: F, interval: Duration)
where
    F: Fn() -> RTCIceGatheringState,
{
    while probe() != RTCIceGatheringState::Complete {
        sleep(interval).await;
    }
}
