use data_contracts::{list_split_files, load_dataspecs, load_split, ContractError, FileNameRule, SplitKey};
use std::fs;

#[test]
fn split_files_are_listed_in_order_and_filtered() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    fs::write(tmp.path().join("SPLIT_1.json"), r#"{"train":[],"validation":[],"test":[]}"#)?;
    fs::write(tmp.path().join("SPLIT_0.json"), r#"{"train":["a"],"validation":[],"test":["b"]}"#)?;
    fs::write(tmp.path().join("notes.txt"), "ignored")?;

    let files = list_split_files(tmp.path())?;
    assert_eq!(files.len(), 2);
    assert!(files[0].ends_with("SPLIT_0.json"));

    let split = load_split(&files[0])?;
    assert_eq!(split.files(SplitKey::Train), ["a".to_string()]);
    assert_eq!(split.files(SplitKey::Test), ["b".to_string()]);
    Ok(())
}

#[test]
fn malformed_split_is_a_json_error() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("SPLIT_0.json");
    fs::write(&path, r#"{"train": "not-a-list"}"#)?;
    let err = load_split(&path).unwrap_err();
    assert!(matches!(err, ContractError::Json { .. }));
    Ok(())
}

#[test]
fn missing_split_dir_is_an_io_error() {
    let err = list_split_files(std::path::Path::new("/definitely/not/here")).unwrap_err();
    assert!(matches!(err, ContractError::Io { .. }));
}

#[test]
fn dataspecs_load_with_defaults() -> anyhow::Result<()> {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("specs.json");
    fs::write(
        &path,
        r#"[{
            "name": "DRIVE",
            "data_dir": "DRIVE/images",
            "label_dir": "DRIVE/manual",
            "split_dir": "DRIVE/splits",
            "label_getter": {"kind": "stem_suffix", "suffix": "_manual1", "extension": "gif"},
            "patch_shape": [388, 388],
            "patch_offset": [200, 200],
            "expand_by": 184
        }]"#,
    )?;
    let specs = load_dataspecs(&path)?;
    assert_eq!(specs.len(), 1);
    let spec = &specs[0];
    assert_eq!(spec.num_class, 2);
    assert_eq!(spec.num_channel, 3);
    assert_eq!(spec.thr_manual, 50);
    assert!(!spec.bbox_crop);
    assert!(!spec.is_resolved());
    assert!(matches!(spec.label_getter, FileNameRule::StemSuffix { .. }));
    let geometry = spec.patch_geometry()?;
    assert_eq!(geometry.shape, (388, 388));
    assert_eq!(geometry.expand_by, 184);
    Ok(())
}
