use dicom::core::{DataElement, PrimitiveValue, VR};
use dicom::object::{FileDicomObject, FileMetaTableBuilder, InMemDicomObject};
use dicom_dictionary_std::{tags, uids};
use gamma_index::{GammaConfig, GammaEngine, GammaError, GridLoader, GridLoaderError};
use std::fs;
use std::path::PathBuf;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("gamma-index-{}-{name}", std::process::id()))
}

fn rt_dose(frames: u16, rows: u16, columns: u16, scaling: f32) -> FileDicomObject<InMemDicomObject> {
    let stored: Vec<u16> = (0..frames * rows * columns).collect();
    let object = InMemDicomObject::from_element_iter([
        DataElement::new(
            tags::SOP_CLASS_UID,
            VR::UI,
            PrimitiveValue::from(uids::RT_DOSE_STORAGE),
        ),
        DataElement::new(tags::SOP_INSTANCE_UID, VR::UI, PrimitiveValue::from("2.25.4242")),
        DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("RTDOSE")),
        DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(1_u16)),
        DataElement::new(
            tags::PHOTOMETRIC_INTERPRETATION,
            VR::CS,
            PrimitiveValue::from("MONOCHROME2"),
        ),
        DataElement::new(
            tags::NUMBER_OF_FRAMES,
            VR::IS,
            PrimitiveValue::from(frames.to_string()),
        ),
        DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(rows)),
        DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(columns)),
        DataElement::new(
            tags::PIXEL_SPACING,
            VR::DS,
            PrimitiveValue::F32(vec![2.5_f32, 2.0].into()),
        ),
        DataElement::new(tags::SLICE_THICKNESS, VR::DS, PrimitiveValue::from(3.0_f32)),
        DataElement::new(tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(16_u16)),
        DataElement::new(tags::BITS_STORED, VR::US, PrimitiveValue::from(16_u16)),
        DataElement::new(tags::HIGH_BIT, VR::US, PrimitiveValue::from(15_u16)),
        DataElement::new(tags::PIXEL_REPRESENTATION, VR::US, PrimitiveValue::from(0_u16)),
        DataElement::new(tags::DOSE_GRID_SCALING, VR::DS, PrimitiveValue::from(scaling)),
        DataElement::new(tags::PIXEL_DATA, VR::OW, PrimitiveValue::U16(stored.into())),
    ]);
    object
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                .media_storage_sop_class_uid(uids::RT_DOSE_STORAGE)
                .media_storage_sop_instance_uid("2.25.4242"),
        )
        .expect("should have built file meta group")
}

#[test]
fn text_files_round_into_a_gamma_run() {
    let reference_path = temp_path("ref2d.txt");
    let target_path = temp_path("tar2d.txt");
    fs::write(&reference_path, "1 2 3\n4 5 6\n").unwrap();
    fs::write(&target_path, "1 2 3\n4 5 6\n\n").unwrap();

    let reference = GridLoader::load_text(&reference_path, 2, vec![2.0, 2.0]).unwrap();
    let target = GridLoader::load_text(&target_path, 2, vec![2.0, 2.0]).unwrap();
    assert_eq!(reference.shape(), &[3, 2]);

    let engine = GammaEngine::new(reference, target, GammaConfig::default()).unwrap();
    let summary = engine.summarize(&engine.run().unwrap());
    assert_eq!(summary.pass_rate_percent, Some(100.0));

    fs::remove_file(reference_path).ok();
    fs::remove_file(target_path).ok();
}

#[test]
fn ragged_text_file_is_a_data_error() {
    let path = temp_path("ragged.txt");
    fs::write(&path, "1 2 3\n4 5\n").unwrap();
    let err = GridLoader::load_text(&path, 2, vec![1.0, 1.0]).unwrap_err();
    assert!(matches!(
        err,
        GammaError::Loader(GridLoaderError::InconsistentRows { line: 2, .. })
    ));
    fs::remove_file(path).ok();
}

#[test]
fn rt_dose_frames_become_the_third_axis() {
    let object = rt_dose(2, 2, 3, 0.5);
    let grid = GridLoader::load_from_dicom_object(&object).unwrap();

    assert_eq!(grid.shape(), &[3, 2, 2]);
    assert_eq!(grid.spacing(), &[2.0, 2.5, 3.0]);
    assert_eq!(grid.value_at(&[1, 0, 0]).unwrap(), 0.5);
    assert_eq!(grid.value_at(&[0, 1, 0]).unwrap(), 1.5);
    assert_eq!(grid.value_at(&[0, 0, 1]).unwrap(), 3.0);
    assert_eq!(grid.max(), 5.5);
}

#[test]
fn single_frame_rt_dose_is_two_dimensional() {
    let object = rt_dose(1, 2, 3, 2.0);
    let grid = GridLoader::load_from_dicom_object(&object).unwrap();

    assert_eq!(grid.shape(), &[3, 2]);
    assert_eq!(grid.spacing(), &[2.0, 2.5]);
    assert_eq!(grid.samples(), &[0.0, 2.0, 4.0, 6.0, 8.0, 10.0]);
}

#[test]
fn rt_dose_files_load_from_disk() {
    let path = temp_path("dose.dcm");
    rt_dose(2, 2, 2, 1.0)
        .write_to_file(&path)
        .expect("should have written RT Dose file");

    let grid = GridLoader::load_dicom(&path).unwrap();
    assert_eq!(grid.shape(), &[2, 2, 2]);
    assert_eq!(grid.samples().len(), 8);

    fs::remove_file(path).ok();
}

#[test]
fn rt_dose_without_scaling_is_rejected() {
    let mut object = rt_dose(1, 2, 2, 0.5);
    assert!(object.remove_element(tags::DOSE_GRID_SCALING));

    let err = GridLoader::load_from_dicom_object(&object).unwrap_err();
    assert!(matches!(
        err,
        GammaError::Loader(GridLoaderError::MissingAttribute("DoseGridScaling"))
    ));
}
