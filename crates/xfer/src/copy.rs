//! Wires [`dispatch::open_session`] and [`copy_pipeline::CopyPipeline`]
//! together: the one call an embedder actually needs to start a transfer
//! between two URLs.

use config::{Settings, XferConfig};
use copy_pipeline::{CopyOptions, CopyPipeline};
use session::XferError;
use xfer_path::Path;

use crate::dispatch::open_session;
use crate::session::AnySession;

/// A copy between two sessions of (possibly different) protocols this core
/// supports; `AnySession` erases which protocol either side actually is.
pub type AnyCopy = CopyPipeline<AnySession, AnySession>;

/// Opens `source_url` and `dest_url` and returns a copy pipeline ready to
/// be driven via [`scheduler::Task::step`]. Neither session is connected
/// yet; the pipeline's own `Initial` state does that lazily on first step.
pub fn start_copy(
    source_url: &str,
    dest_url: &str,
    settings: &Settings,
    cont: bool,
    options: CopyOptions,
) -> Result<AnyCopy, XferError> {
    let get = open_session(source_url, settings)?;
    let put = open_session(dest_url, settings)?;
    let xfer = XferConfig::from_settings(settings, None);

    let get_path = path_of(source_url)?;
    let put_path = path_of(dest_url)?;

    Ok(CopyPipeline::new(get, put, get_path, put_path, cont, options, xfer.rate_period, xfer.eta_period))
}

fn path_of(url: &str) -> Result<Path, XferError> {
    let parsed = urlgrammar::Url::parse(url).map_err(|e| XferError::Fatal(e.to_string()))?;
    let raw = parsed.path.as_deref().unwrap_or("/");
    let decoded = String::from_utf8_lossy(&urlgrammar::url_decode(raw)).into_owned();
    Ok(Path::parse(&decoded))
}
