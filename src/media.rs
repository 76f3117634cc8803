use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use webrtc::api::media_engine::MIME_TYPE_OPUS;
use webrtc::media::io::ogg_reader::OggReader;
use webrtc::media::Sample;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::error::{Error, MediaError};
use crate::logger::log;

const OGG_PAGE_DURATION: Duration = Duration::from_millis(20);

/// What the session asks of the capture device: audio only.
#[derive(Debug, Clone, Copy)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: false,
        }
    }
}

/// The local capture collaborator. `acquire` hands over the local tracks to
/// feed into the peer connection and must have completed before the offer is
/// built; `release` stops capture on session teardown.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn acquire(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<Vec<Arc<dyn TrackLocal + Send + Sync>>, Error>;

    async fn release(&self);
}

/// Serves an Opus `.ogg` file as the capture device: one audio track, pages
/// pumped on a fixed ticker, sample durations paced by the granule deltas.
/// An unreadable file is the device refusing capture.
pub struct FileAudioSource {
    path: PathBuf,
    pump: Mutex<Option<JoinHandle<()>>>,
}

impl FileAudioSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            pump: Mutex::new(None),
        }
    }
}

#[async_trait]
impl MediaSource for FileAudioSource {
    async fn acquire(
        &self,
        constraints: &MediaConstraints,
    ) -> Result<Vec<Arc<dyn TrackLocal + Send + Sync>>, Error> {
        if !constraints.audio {
            return Ok(Vec::new());
        }

        let file = File::open(&self.path).map_err(|e| {
            MediaError::AcquisitionDenied(format!("{}: {e}", self.path.display()))
        })?;
        // Non-checksum mode, as for any locally produced file.
        let (mut ogg, _header) = OggReader::new(BufReader::new(file), true)
            .map_err(|e| MediaError::AcquisitionDenied(e.to_string()))?;

        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            "audio".to_owned(),
            "vokal-audio".to_owned(),
        ));

        let pump_track = track.clone();
        let path = self.path.clone();
        let handle = tokio::spawn(async move {
            // A ticker instead of sleep so page parsing time does not skew
            // the pacing.
            let mut ticker = tokio::time::interval(OGG_PAGE_DURATION);
            let mut last_granule: u64 = 0;

            while let Ok((page_data, page_header)) = ogg.parse_next_page() {
                let sample_count = page_header.granule_position.saturating_sub(last_granule);
                last_granule = page_header.granule_position;
                let sample_duration = Duration::from_millis(sample_count * 1000 / 48000);

                if pump_track
                    .write_sample(&Sample {
                        data: page_data.freeze(),
                        duration: sample_duration,
                        ..Default::default()
                    })
                    .await
                    .is_err()
                {
                    break;
                }

                let _ = ticker.tick().await;
            }
            log(&format!("audio source {} drained", path.display()));
        });
        *self.pump.lock().unwrap() = Some(handle);

        Ok(vec![track as Arc<dyn TrackLocal + Send + Sync>])
    }

    async fn release(&self) {
        if let Some(handle) = self.pump.lock().unwrap().take() {
            handle.abort();
        }
    }
}
