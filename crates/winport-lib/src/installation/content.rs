//! Downloaded content verification.

use std::path::PathBuf;

use crate::ports::Distribution;

/// Checks every downloaded file against the sha256 digest of its source.
///
/// `files` are in the same order as `dist.sources`. Sources without a digest are accepted as is,
/// nothing is checked when [`do_checksums`](crate::Config::do_checksums) is off.
///
/// # Errors
/// - [`DigestMismatch`](crate::Error::DigestMismatch) on the first file whose digest differs.
/// - [`IO`](crate::Error::IO) when a file can't be read.
pub fn verify_digests(config: &crate::Config, dist: &Distribution, files: &[PathBuf]) -> crate::Result<()> {
	if !config.do_checksums() {
		log::trace!("Checksums disabled, not verifying {}", dist);
		return Ok(())
	}

	for (source, file) in dist.sources.iter().zip(files) {
		let Some(expected) = &source.sha256 else { continue };
		let content = std::fs::read(file)?;
		let digest = sha256::digest(content.as_slice());
		if !digest.eq_ignore_ascii_case(expected.trim()) {
			log::warn!("{} has digest {}, expected {}", file.display(), digest, expected);
			return Err(crate::Error::DigestMismatch { distribution: dist.to_string(), file: file.clone() })
		}
	}
	Ok(())
}
