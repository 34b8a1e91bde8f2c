use anyhow::{anyhow, Context, Result};
use std::path::Path;

/// Class names of the 80-class COCO set, in model output order.
pub const COCO_CLASS_NAMES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

pub fn coco_class_names() -> Vec<String> {
    COCO_CLASS_NAMES.iter().map(|name| name.to_string()).collect()
}

/// Load class names from a file with one name per line. Blank lines are skipped.
pub fn load_class_names(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read class names from {}", path.display()))?;
    let names: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if names.is_empty() {
        return Err(anyhow!("class names file {} is empty", path.display()));
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coco_indices_match_laundry_labels() {
        assert_eq!(COCO_CLASS_NAMES[27], "tie");
        assert_eq!(COCO_CLASS_NAMES[76], "scissors");
        assert_eq!(COCO_CLASS_NAMES[77], "teddy bear");
    }

    #[test]
    fn class_names_file_skips_blank_lines() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("names.txt");
        std::fs::write(&path, "shirt\n\n pants \nstain\n")?;
        assert_eq!(load_class_names(&path)?, vec!["shirt", "pants", "stain"]);
        Ok(())
    }
}
