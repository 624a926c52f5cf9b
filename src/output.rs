use std::net::SocketAddr;

use crate::channel::client::Subscription;
use crate::channel::wire::Envelope;

/// Render one received notification.
///
/// - `json = true`: the raw envelope line, unchanged, so output can be piped
///   into other JSON tools.
/// - `json = false`: a one-line summary such as `put    file /docs/a.md (12 bytes)`.
pub fn format_event(line: &str, envelope: &Envelope, json: bool) -> String {
    if json {
        return line.trim_end().to_string();
    }

    let payload = envelope.payload();
    let target = if payload.is_path_dir { "dir " } else { "file" };
    let mut out = format!("{:<6} {} {}", envelope.verb(), target, payload.file_path);
    if let Some(body) = &payload.body_text {
        out.push_str(&format!(" ({} bytes)", body.len()));
    }
    out
}

/// Print every notification from `addr` to stdout until the server hangs up.
///
/// Lines that fail to decode are reported on **stderr** and skipped so the
/// stdout stream stays clean.
pub async fn listen(addr: SocketAddr, json: bool) -> anyhow::Result<()> {
    let mut subscription = Subscription::connect(addr).await?;
    tracing::info!(%addr, "listening for changes");

    loop {
        match subscription.next_envelope().await {
            Ok(Some((line, envelope))) => println!("{}", format_event(&line, &envelope, json)),
            Ok(None) => break,
            Err(err) if err.is::<std::io::Error>() => return Err(err),
            Err(err) => eprintln!("{err:#}"),
        }
    }

    tracing::info!("notification channel closed");
    Ok(())
}
