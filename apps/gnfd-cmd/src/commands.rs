//! Subcommand implementations.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use gnfd_protocol::{parse_bucket, parse_bucket_object};
use gnfd_sp_client::{AuthInfo, Client, GetObjectOptions, HexKeyFile, KeyStore};
use gnfd_transfer::{SpeedCalculator, compute_file_piece_hashes};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::config::Config;

pub async fn hash(config: &Config, file: PathBuf, cancel: &CancellationToken) -> anyhow::Result<()> {
    let roots = compute_file_piece_hashes(
        file.clone(),
        config.segment_size,
        config.ec_shards,
        cancel.clone(),
    )
    .await
    .with_context(|| format!("failed to hash {}", file.display()))?;

    println!("size:           {}", roots.object_size);
    println!("segments:       {}", roots.segment_count);
    println!("content sha256: {}", roots.content_sha256_hex());
    println!("primary root:   {}", roots.primary_root_hex());
    for (i, shard) in roots.shard_roots_hex().iter().enumerate() {
        println!("shard root {i:<3}: {shard}");
    }
    Ok(())
}

pub async fn get(
    config: &Config,
    url: &str,
    file: &Path,
    start: u64,
    end: u64,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let (bucket, object) = parse_bucket_object(url)?;
    if file.is_dir() {
        bail!("{} is a directory", file.display());
    }
    let client = build_client(config)?;

    let opts = GetObjectOptions::range(start, end);
    let (mut body, info) = client.get_object(&bucket, &object, &opts, cancel).await?;

    let mut out = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(file)
        .await
        .with_context(|| format!("failed to open {}", file.display()))?;

    let speed = SpeedCalculator::new(None, None);
    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => bail!("download cancelled"),
            c = body.next_chunk() => c?,
        };
        let Some(chunk) = chunk else {
            break;
        };
        out.write_all(&chunk).await?;
        speed.add_sample(chunk.len() as u64);
    }
    out.flush().await?;

    println!(
        "downloaded {} ({} bytes, {}/s) to {}",
        info.object_name,
        speed.total_bytes(),
        human_bytes(speed.bytes_per_second()),
        file.display()
    );
    if !info.etag.is_empty() {
        println!("etag: {}", info.etag);
    }
    Ok(())
}

pub async fn ls(
    config: &Config,
    url: &str,
    prefix: Option<&str>,
    max_keys: Option<u64>,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let bucket = parse_bucket(url)?;
    let client = build_client(config)?;
    let result = client.list_objects(&bucket, prefix, max_keys, cancel).await?;

    for entry in &result.objects {
        println!("{:>12}  {}", entry.size, entry.key);
    }
    if result.is_truncated {
        println!("(truncated at {} keys)", result.objects.len());
    }
    Ok(())
}

pub async fn approve(config: &Config, url: &str, cancel: &CancellationToken) -> anyhow::Result<()> {
    let (bucket, object) = match parse_bucket_object(url) {
        Ok((bucket, object)) if !object.is_empty() => (bucket, Some(object)),
        _ => (parse_bucket(url)?, None),
    };
    let client = build_client(config)?;
    let signature = client
        .get_approval(&bucket, object.as_deref(), &AuthInfo::V1, cancel)
        .await?;
    println!("{signature}");
    Ok(())
}

fn build_client(config: &Config) -> anyhow::Result<Client> {
    if config.endpoint.is_empty() {
        bail!("no endpoint configured; pass --endpoint or set it in the config file");
    }
    let account = match &config.key_file {
        Some(path) => Some(
            HexKeyFile::new(path)
                .default_account()
                .with_context(|| format!("failed to load key {}", path.display()))?,
        ),
        None => None,
    };
    if let Some(account) = &account {
        tracing::debug!(address = %account.address(), "loaded signing account");
    }
    Ok(Client::new(config.client_config(), account)?)
}

fn human_bytes(bytes_per_second: f64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes_per_second;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
