//! Blocking HTTP downloads for install payloads.

use anyhow::{bail, Context as _, Result};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use std::{
    collections::BTreeMap,
    fs,
    io::{Read, Write},
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::Error;
use crate::settings::Proxy;

/// Builds the shared HTTP client, wiring in the configured proxy.
pub fn build_client(proxy: &Proxy) -> Result<Client> {
    let mut builder = Client::builder()
        .timeout(Duration::from_secs(600))
        .connect_timeout(Duration::from_secs(30));
    if proxy.enable && !proxy.url.is_empty() {
        builder = builder.proxy(
            reqwest::Proxy::all(&proxy.url)
                .with_context(|| format!("invalid proxy url {}", proxy.url))?,
        );
    }
    builder.build().context("failed to build the http client")
}

/// Downloads `url` into `dest_dir`, returning the file path.
///
/// The body is streamed into a `.part` sibling which is renamed into place
/// only after the full body arrived, so an interrupted download never leaves
/// a plausible-looking file behind. A 404 maps to [`Error::NotFound`] since
/// it usually means a version the source does not carry.
pub fn download(
    client: &Client,
    url: &str,
    headers: &BTreeMap<String, String>,
    dest_dir: &Path,
) -> Result<PathBuf> {
    let filename = filename_of(url)?;
    let dest = dest_dir.join(&filename);
    let part = dest_dir.join(format!("{filename}.part"));

    let mut request = client.get(url);
    for (key, value) in headers {
        request = request.header(key, value);
    }
    let mut response = request
        .send()
        .with_context(|| format!("failed to fetch {url}"))?;

    if response.status() == StatusCode::NOT_FOUND {
        return Err(Error::NotFound(url.to_string()).into());
    }
    if !response.status().is_success() {
        bail!("fetching {url} returned {}", response.status());
    }

    let total = response.content_length();
    let mut file = fs::File::create(&part)
        .with_context(|| format!("failed to create {}", part.display()))?;
    let mut buf = [0u8; 64 * 1024];
    let mut written: u64 = 0;
    loop {
        let n = response
            .read(&mut buf)
            .with_context(|| format!("failed while downloading {url}"))?;
        if n == 0 {
            break;
        }
        file.write_all(&buf[..n])
            .with_context(|| format!("failed to write {}", part.display()))?;
        written += n as u64;
        report_progress(&filename, written, total);
    }
    drop(file);
    eprintln!();

    fs::rename(&part, &dest)
        .with_context(|| format!("failed to move {} into place", part.display()))?;
    Ok(dest)
}

fn report_progress(filename: &str, written: u64, total: Option<u64>) {
    match total {
        Some(total) if total > 0 => {
            eprint!("\r{filename}: {written}/{total} bytes")
        }
        _ => eprint!("\r{filename}: {written} bytes"),
    }
}

fn filename_of(url: &str) -> Result<String> {
    let trimmed = url.split(['?', '#']).next().unwrap_or(url);
    let name = trimmed.rsplit('/').next().unwrap_or_default();
    if name.is_empty() {
        bail!("cannot derive a filename from {url}");
    }
    Ok(name.to_string())
}
