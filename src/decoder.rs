//! Random-access frame decoding.
//!
//! [`FrameDecoder`] keeps one demuxer and one decoder open for a whole run and
//! serves frames by index. Requests in increasing order are decoded forward
//! without seeking, which is the access pattern of both frame extraction and
//! blur scoring. A request behind the current position, or far ahead of it,
//! seeks to the nearest preceding keyframe first.

use std::path::{Path, PathBuf};

use ffmpeg_next::{
    Error as FfmpegError, Packet, Rational,
    codec::{context::Context as CodecContext, decoder::Video as VideoDecoder},
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
    util::error::EAGAIN,
};
use image::{DynamicImage, GrayImage, RgbImage};

use crate::{
    error::VidmeshError,
    utilities::{
        frame_to_packed_buffer, pts_to_seconds, seconds_to_av_time_base, seconds_to_frame_number,
    },
};

/// Forward distance (in seconds of video) beyond which a seek is cheaper than
/// decoding through.
const SEEK_AHEAD_SECONDS: f64 = 2.0;

/// Pixel layout of decoded frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 8-bit RGB, for frames that are written out.
    Rgb8,
    /// 8-bit luma, for sharpness scoring.
    Gray8,
}

impl PixelFormat {
    fn ffmpeg_pixel(self) -> Pixel {
        match self {
            PixelFormat::Rgb8 => Pixel::RGB24,
            PixelFormat::Gray8 => Pixel::GRAY8,
        }
    }
}

/// Decodes frames of one video stream by index.
pub struct FrameDecoder {
    path: PathBuf,
    input: Input,
    decoder: VideoDecoder,
    stream_index: usize,
    time_base: Rational,
    start_pts: i64,
    frames_per_second: f64,
    rgb_scaler: Option<ScalingContext>,
    gray_scaler: Option<ScalingContext>,
    decoded: VideoFrame,
    last_frame: Option<u64>,
    flushed: bool,
}

impl FrameDecoder {
    /// Open the best video stream of `path`.
    ///
    /// `frames_per_second` must be the rate the frame indices were computed
    /// with, normally [`VideoDescriptor::frames_per_second`](crate::VideoDescriptor).
    ///
    /// # Errors
    ///
    /// Returns [`VidmeshError::Probe`] if the file cannot be opened or has no
    /// video stream, or [`VidmeshError::Ffmpeg`] if no decoder is available.
    pub fn open<P: AsRef<Path>>(path: P, frames_per_second: f64) -> Result<Self, VidmeshError> {
        ffmpeg_next::init()?;

        let path = path.as_ref().to_path_buf();
        let input = ffmpeg_next::format::input(&path).map_err(|error| VidmeshError::Probe {
            path: path.clone(),
            reason: error.to_string(),
        })?;

        let stream = input
            .streams()
            .best(Type::Video)
            .ok_or_else(|| VidmeshError::Probe {
                path: path.clone(),
                reason: "no video stream".into(),
            })?;
        let stream_index = stream.index();
        let time_base = stream.time_base();
        let start_pts = match stream.start_time() {
            ffmpeg_sys_next::AV_NOPTS_VALUE => 0,
            start => start,
        };
        let decoder = CodecContext::from_parameters(stream.parameters())?
            .decoder()
            .video()?;

        log::debug!(
            "Opened decoder for {} (stream {stream_index}, {}x{})",
            path.display(),
            decoder.width(),
            decoder.height()
        );

        Ok(Self {
            path,
            input,
            decoder,
            stream_index,
            time_base,
            start_pts,
            frames_per_second,
            rgb_scaler: None,
            gray_scaler: None,
            decoded: VideoFrame::empty(),
            last_frame: None,
            flushed: false,
        })
    }

    /// Decode frame `frame_index`.
    ///
    /// If the stream has no frame with exactly that index (variable frame
    /// rate, dropped frames) the first frame after it is returned.
    ///
    /// # Errors
    ///
    /// Returns [`VidmeshError::VideoDecode`] if the stream ends before the
    /// frame, or [`VidmeshError::Ffmpeg`] on a demuxer or decoder failure.
    pub fn frame(&mut self, frame_index: u64, format: PixelFormat) -> Result<DynamicImage, VidmeshError> {
        if self.needs_seek(frame_index) {
            self.seek_to(frame_index)?;
        }

        loop {
            match self.decoder.receive_frame(&mut self.decoded) {
                Ok(()) => {
                    let current = self.current_frame_number();
                    self.last_frame = Some(current);
                    if current >= frame_index {
                        return self.convert(format);
                    }
                }
                Err(FfmpegError::Other { errno }) if errno == EAGAIN => self.feed_packet()?,
                Err(FfmpegError::Eof) => {
                    return Err(VidmeshError::VideoDecode(format!(
                        "frame {frame_index} is past the end of {}",
                        self.path.display()
                    )));
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    fn needs_seek(&self, frame_index: u64) -> bool {
        match self.last_frame {
            None => frame_index as f64 > SEEK_AHEAD_SECONDS * self.frames_per_second,
            Some(last) => {
                frame_index <= last
                    || (frame_index - last) as f64 > SEEK_AHEAD_SECONDS * self.frames_per_second
            }
        }
    }

    fn seek_to(&mut self, frame_index: u64) -> Result<(), VidmeshError> {
        let seconds = frame_index as f64 / self.frames_per_second;
        let target = seconds_to_av_time_base(seconds);
        log::debug!("Seeking to frame {frame_index} ({seconds:.3}s)");

        self.input.seek(target, ..target)?;
        self.decoder.flush();
        self.last_frame = None;
        self.flushed = false;
        Ok(())
    }

    /// Read packets until one for our stream has been sent to the decoder,
    /// or signal end of stream.
    fn feed_packet(&mut self) -> Result<(), VidmeshError> {
        if self.flushed {
            return Err(FfmpegError::Eof.into());
        }

        let mut packet = Packet::empty();
        loop {
            match packet.read(&mut self.input) {
                Ok(()) if packet.stream() == self.stream_index => {
                    return match self.decoder.send_packet(&packet) {
                        Ok(()) => Ok(()),
                        Err(error) => {
                            // The next keyframe resynchronises the decoder.
                            log::warn!("Skipping undecodable packet: {error}");
                            Ok(())
                        }
                    };
                }
                Ok(()) => continue,
                Err(FfmpegError::Eof) => {
                    self.decoder.send_eof()?;
                    self.flushed = true;
                    return Ok(());
                }
                Err(error) => return Err(error.into()),
            }
        }
    }

    fn current_frame_number(&self) -> u64 {
        match self.decoded.timestamp().or_else(|| self.decoded.pts()) {
            Some(pts) => {
                let seconds = pts_to_seconds(pts - self.start_pts, self.time_base);
                seconds_to_frame_number(seconds, self.frames_per_second)
            }
            None => self.last_frame.map_or(0, |last| last + 1),
        }
    }

    fn convert(&mut self, format: PixelFormat) -> Result<DynamicImage, VidmeshError> {
        let width = self.decoded.width();
        let height = self.decoded.height();
        let slot = match format {
            PixelFormat::Rgb8 => &mut self.rgb_scaler,
            PixelFormat::Gray8 => &mut self.gray_scaler,
        };

        let stale = slot.as_ref().is_none_or(|scaler| {
            scaler.input().width != width
                || scaler.input().height != height
                || scaler.input().format != self.decoded.format()
        });
        if stale {
            *slot = Some(ScalingContext::get(
                self.decoded.format(),
                width,
                height,
                format.ffmpeg_pixel(),
                width,
                height,
                ScalingFlags::BILINEAR,
            )?);
        }
        let Some(scaler) = slot.as_mut() else {
            return Err(VidmeshError::VideoDecode("no scaler available".into()));
        };

        let mut converted = VideoFrame::empty();
        scaler.run(&self.decoded, &mut converted)?;

        let image = match format {
            PixelFormat::Rgb8 => {
                let buffer = frame_to_packed_buffer(&converted, width, height, 3);
                RgbImage::from_raw(width, height, buffer).map(DynamicImage::ImageRgb8)
            }
            PixelFormat::Gray8 => {
                let buffer = frame_to_packed_buffer(&converted, width, height, 1);
                GrayImage::from_raw(width, height, buffer).map(DynamicImage::ImageLuma8)
            }
        };

        image.ok_or_else(|| {
            VidmeshError::VideoDecode(
                "Failed to construct image from decoded frame data".to_string(),
            )
        })
    }
}
