#[cfg(target_os = "windows")]
use std::path::Path;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-env-changed=FFMPEG_DIR");

    // Only the FFmpeg engine links against native libraries.
    if std::env::var_os("CARGO_FEATURE_FFMPEG").is_none() {
        return;
    }

    let ffmpeg_dir = std::env::var("FFMPEG_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("third_party/ffmpeg"));
    let ffmpeg_bin = ffmpeg_dir.join("bin");
    let ffmpeg_lib = ffmpeg_dir.join("lib");

    if ffmpeg_lib.exists() {
        println!("cargo:rustc-link-search=native={}", ffmpeg_lib.display());
    }

    #[cfg(target_os = "windows")]
    copy_ffmpeg_dlls(&ffmpeg_bin);
    #[cfg(not(target_os = "windows"))]
    let _ = ffmpeg_bin;
}

/// Copy the FFmpeg DLLs next to the produced executable
#[cfg(target_os = "windows")]
fn copy_ffmpeg_dlls(ffmpeg_bin: &Path) {
    println!("cargo:rerun-if-changed={}", ffmpeg_bin.display());

    if !ffmpeg_bin.exists() {
        println!(
            "cargo:warning=FFmpeg DLLs not found at {}",
            ffmpeg_bin.display()
        );
        return;
    }

    let Some(out_dir) = std::env::var_os("OUT_DIR").map(PathBuf::from) else {
        return;
    };
    // OUT_DIR is target/<profile>/build/<crate>/out
    let Some(target_dir) = out_dir.ancestors().nth(3) else {
        println!("cargo:warning=cannot resolve the target dir from OUT_DIR");
        return;
    };

    let entries = match std::fs::read_dir(ffmpeg_bin) {
        Ok(entries) => entries,
        Err(e) => {
            println!("cargo:warning=cannot read {}: {}", ffmpeg_bin.display(), e);
            return;
        }
    };

    for path in entries.flatten().map(|e| e.path()) {
        if !is_required_ffmpeg_dll(&path) {
            continue;
        }
        let Some(name) = path.file_name() else {
            continue;
        };
        let dest = target_dir.join(name);
        if !dest.exists() || file_modified(&path) > file_modified(&dest) {
            match std::fs::copy(&path, &dest) {
                Ok(_) => println!("cargo:warning=Copied {} to output dir", path.display()),
                Err(e) => println!(
                    "cargo:warning=Failed to copy {} to {}: {}",
                    path.display(),
                    dest.display(),
                    e
                ),
            }
        }
    }
}

#[cfg(target_os = "windows")]
fn file_modified(path: &Path) -> std::time::SystemTime {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
}

/// Video decoding only needs the codec and utility libraries
#[cfg(target_os = "windows")]
fn is_required_ffmpeg_dll(path: &Path) -> bool {
    const REQUIRED_DLL_PREFIXES: &[&str] = &["avcodec-", "avutil-", "swresample-"];

    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };

    let lower = file_name.to_ascii_lowercase();
    lower.ends_with(".dll") && REQUIRED_DLL_PREFIXES.iter().any(|prefix| lower.starts_with(prefix))
}
