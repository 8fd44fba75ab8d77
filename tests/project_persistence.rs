use glam::UVec2;
use pixelart_core::{Color, Engine, EngineParams, LabImage, ProjectFile};

#[test]
fn project_file_round_trips_through_disk() {
    let pixels = vec![Color::new(40.0, 10.0, -10.0); 8 * 8];
    let input = LabImage::from_pixels(pixels, UVec2::new(8, 8)).unwrap();
    let mut engine = Engine::new(input, UVec2::new(2, 2), 2, EngineParams::default()).unwrap();
    engine.iterate();
    engine.iterate();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("project.json");

    let project = ProjectFile::from_engine(&engine);
    std::fs::write(&path, project.to_json().unwrap()).unwrap();

    let loaded = ProjectFile::from_json(&std::fs::read_to_string(&path).unwrap()).unwrap();
    let restored = loaded.into_engine().unwrap();

    assert!(restored.has_converged());
    assert_eq!(restored.palette_colors().len(), engine.palette_colors().len());
}
