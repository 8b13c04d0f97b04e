use std::io::Write;

/// A gzipped tarball wrapped in a single top-level directory, like the ones
/// served by the host, with a `component.json` naming `reference`.
pub fn package_archive(reference: &str) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    let manifest = format!("{{\"version\": \"{reference}\"}}");
    let mut header = tar::Header::new_gnu();
    header.set_size(manifest.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(
            &mut header,
            "owner-repo-1a2b3c4/component.json",
            manifest.as_bytes(),
        )
        .unwrap();
    let tar = builder.into_inner().unwrap();

    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&tar).unwrap();
    encoder.finish().unwrap()
}
