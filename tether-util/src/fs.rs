use std::fs;
use std::io::{self, Write};
use std::path::Path;

use super::crypto::{ALPHA_NUM, pseudorandom_string};

/// Atomically creates a file with the given contents, overwriting
/// it if one exists.
///
/// The buffer is first written to a sibling temp file which is synced and
/// then renamed over the destination, so readers either see the previous
/// contents or the new ones, never a partial write.
///
/// Read: [Ensuring data reaches to disk](https://lwn.net/Articles/457667/).
pub fn safe_write_all<P: AsRef<Path>, B: AsRef<[u8]>>(path: P, buf: B) -> io::Result<()> {
    let tmp_ext = "sync-".to_owned() + &pseudorandom_string(ALPHA_NUM, 6);
    let tmp_path = path.as_ref().with_extension(tmp_ext);
    let mut tmp_file = fs::File::create(&tmp_path)?;

    tmp_file.write_all(buf.as_ref())?;
    tmp_file.flush()?;
    tmp_file.sync_all()?;
    drop(tmp_file);

    if let Err(err) = fs::rename(&tmp_path, path.as_ref()) {
        // don't leave the temp file lying around
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}
