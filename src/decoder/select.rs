use super::DecoderEntry;

/// `item` names `entry` as "decoder", "family:decoder" or "family:*"
fn names_entry(item: &str, entry: &DecoderEntry) -> bool {
    match item.split_once(':') {
        Some((family, "*")) => family == entry.family,
        Some((family, decoder)) => family == entry.family && decoder == entry.decoder,
        None => item == entry.decoder,
    }
}

/// Ordered decoder candidates for `codec`
///
/// Without a selection every decoder for `codec` is returned in driver order.
/// A selection is a comma separated list: named decoders move to the front in
/// the order given, `-name` removes a decoder, and a lone `-` removes every
/// decoder that was not named explicitly.
pub fn select_decoders(
    all: &[DecoderEntry],
    codec: &str,
    selection: Option<&str>,
) -> Vec<DecoderEntry> {
    let candidates: Vec<&DecoderEntry> = all.iter().filter(|e| e.codec == codec).collect();

    let Some(selection) = selection.map(str::trim).filter(|s| !s.is_empty()) else {
        return candidates.into_iter().cloned().collect();
    };

    let mut selected: Vec<DecoderEntry> = Vec::new();
    let mut excluded: Vec<&str> = Vec::new();
    let mut fallback = true;

    for item in selection.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if item == "-" {
            fallback = false;
        } else if let Some(name) = item.strip_prefix('-') {
            excluded.push(name);
        } else {
            for entry in &candidates {
                if names_entry(item, entry) && !selected.contains(entry) {
                    selected.push((*entry).clone());
                }
            }
        }
    }

    if fallback {
        for entry in candidates {
            if !selected.contains(entry) {
                selected.push(entry.clone());
            }
        }
    }

    selected.retain(|e| !excluded.iter().any(|name| names_entry(name, e)));
    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries() -> Vec<DecoderEntry> {
        vec![
            DecoderEntry::new("ffmpeg", "h264", "h264", "H.264 software"),
            DecoderEntry::new("ffmpeg", "h264", "h264_cuvid", "H.264 NVDEC"),
            DecoderEntry::new("ffmpeg", "hevc", "hevc", "HEVC software"),
            DecoderEntry::new("rawvideo", "rawvideo", "rawvideo", "passthrough"),
        ]
    }

    fn names(list: &[DecoderEntry]) -> Vec<&str> {
        list.iter().map(|e| e.decoder.as_str()).collect()
    }

    #[test]
    fn test_no_selection_keeps_driver_order() {
        let list = select_decoders(&entries(), "h264", None);
        assert_eq!(names(&list), ["h264", "h264_cuvid"]);
        assert!(select_decoders(&entries(), "vp9", None).is_empty());
    }

    #[test]
    fn test_selected_decoders_move_to_front() {
        let list = select_decoders(&entries(), "h264", Some("h264_cuvid"));
        assert_eq!(names(&list), ["h264_cuvid", "h264"]);

        let list = select_decoders(&entries(), "h264", Some("ffmpeg:h264_cuvid"));
        assert_eq!(names(&list), ["h264_cuvid", "h264"]);
    }

    #[test]
    fn test_exclusion_and_no_fallback() {
        let list = select_decoders(&entries(), "h264", Some("-h264_cuvid"));
        assert_eq!(names(&list), ["h264"]);

        let list = select_decoders(&entries(), "h264", Some("h264_cuvid,-"));
        assert_eq!(names(&list), ["h264_cuvid"]);

        let list = select_decoders(&entries(), "h264", Some("hevc,-"));
        assert!(list.is_empty());
    }

    #[test]
    fn test_family_wildcard() {
        let list = select_decoders(&entries(), "h264", Some("-ffmpeg:*"));
        assert!(list.is_empty());

        let list = select_decoders(&entries(), "rawvideo", Some(" rawvideo:* , "));
        assert_eq!(names(&list), ["rawvideo"]);
    }
}
