use std::path::Path;

use music_particles_core::{ParticleFxError, Result, SampleBuffer};
use symphonia::core::{
    audio::SampleBuffer as PcmBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

/// Decodes the first audio track of `path` into a mono 16-bit buffer.
/// Multi-channel audio is averaged down to one channel.
pub fn decode_mono(path: &Path) -> Result<SampleBuffer> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|err| decode_error(path, "probe", err))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| ParticleFxError::msg(format!("{}: no audio track", path.display())))?;

    let track_id = track.id;
    let channels = track.codec_params.channels.map_or(1, |c| c.count()).max(1);
    let sample_rate = track.codec_params.sample_rate.ok_or_else(|| {
        ParticleFxError::msg(format!("{}: unknown sample rate", path.display()))
    })?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|err| decode_error(path, "open decoder for", err))?;

    let mut mono: Vec<i16> = Vec::new();
    let mut skipped = 0_usize;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref err))
                if err.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(err) => return Err(decode_error(path, "read", err)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(_)) => {
                skipped += 1;
                continue;
            }
            Err(err) => return Err(decode_error(path, "decode", err)),
        };

        let spec = *decoded.spec();
        let mut pcm = PcmBuffer::<i16>::new(decoded.capacity() as u64, spec);
        pcm.copy_interleaved_ref(decoded);

        if channels == 1 {
            mono.extend_from_slice(pcm.samples());
        } else {
            mono.extend(pcm.samples().chunks(channels).map(|frame| {
                let sum: i32 = frame.iter().map(|s| i32::from(*s)).sum();
                (sum / frame.len() as i32) as i16
            }));
        }
    }

    if skipped > 0 {
        tracing::warn!(skipped, "skipped undecodable packets");
    }
    tracing::info!(
        path = %path.display(),
        samples = mono.len(),
        sample_rate,
        channels,
        seconds = mono.len() as f32 / sample_rate as f32,
        "decoded audio"
    );

    SampleBuffer::new(mono, sample_rate)
}

fn decode_error(path: &Path, action: &str, err: SymphoniaError) -> ParticleFxError {
    ParticleFxError::msg(format!("failed to {action} {}: {err}", path.display()))
}
