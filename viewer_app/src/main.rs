//! Model viewer
//!
//! Opens a window, loads an OBJ or glTF model and orbits a camera around it.
//!
//! ```text
//! viewer [config.toml|config.ron] [model.obj|model.gltf|model.glb] [texture.png]
//! ```
//!
//! Drag with the left mouse button or use the arrow keys to orbit, scroll to
//! zoom, Space to reset the view and Escape to quit.

use std::path::{Path, PathBuf};

use forge_engine::assets::{load_scene, ImageData, ObjLoader};
use forge_engine::foundation::logging;
use forge_engine::foundation::math::Point3;
use forge_engine::prelude::*;

/// Paths given on the command line, classified by extension
#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    model: Option<PathBuf>,
    texture: Option<PathBuf>,
}

impl Args {
    fn parse(args: impl Iterator<Item = String>) -> Self {
        let mut parsed = Self::default();
        for arg in args {
            let path = PathBuf::from(arg);
            match extension(&path).as_deref() {
                Some("toml" | "ron") => parsed.config = Some(path),
                Some("obj" | "gltf" | "glb") => parsed.model = Some(path),
                _ => parsed.texture = Some(path),
            }
        }
        parsed
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Upload the model named by `args` (or the configured default) into `renderer`
///
/// A texture given on the command line replaces every material texture. glTF
/// meshes otherwise use their own base colour texture, and fall back to the
/// configured default texture. Returns the scene to draw and a bounding sphere
/// to frame the camera on.
fn load_model(
    renderer: &mut VulkanRenderer,
    assets: &AssetConfig,
    args: &Args,
) -> Result<(SceneGraph, Vec3, f32), EngineError> {
    let override_texture = args
        .texture
        .as_ref()
        .map(|path| ImageData::from_file(path.display().to_string()))
        .transpose()?;
    let default_texture = assets
        .default_texture
        .as_deref()
        .map(|path| ImageData::from_file(assets.resolve(path)))
        .transpose()?;

    let model = match (&args.model, &assets.default_model) {
        (Some(path), _) => Some(path.display().to_string()),
        (None, Some(default)) => Some(assets.resolve(default)),
        (None, None) => None,
    };

    let mut scene = SceneGraph::new();
    let Some(model) = model else {
        log::info!("No model configured, showing a cube");
        let handle = renderer.add_asset(RenderAsset::from_mesh(MeshData::cube()))?;
        let root = scene.add_root("cube", Transform::identity());
        scene.set_mesh(root, handle)?;
        return Ok((scene, Vec3::zeros(), 0.87));
    };

    log::info!("Loading model {}", model);
    let mut meshes = Vec::new();
    match extension(Path::new(&model)).as_deref() {
        Some("gltf" | "glb") => {
            let loaded = load_scene(&model)?;
            let mut handles = Vec::with_capacity(loaded.meshes.len());
            for (index, mesh) in loaded.meshes.iter().enumerate() {
                let texture = override_texture
                    .as_ref()
                    .or_else(|| loaded.texture_for(index))
                    .or(default_texture.as_ref());
                let mut asset = RenderAsset::from_mesh(mesh.clone());
                if let Some(texture) = texture {
                    asset = asset.with_texture(texture.clone());
                }
                handles.push(renderer.add_asset(asset)?);
                meshes.push(mesh.clone());
            }
            scene = loaded.graph;
            scene.remap_meshes(|handle| handles.get(handle.0).copied());
        }
        _ => {
            let mesh = ObjLoader::load_obj(&model)?;
            let mut asset = RenderAsset::from_mesh(mesh.clone());
            if let Some(texture) = override_texture.or(default_texture) {
                asset = asset.with_texture(texture);
            }
            let handle = renderer.add_asset(asset)?;
            let root = scene.add_root("model", Transform::identity());
            scene.set_mesh(root, handle)?;
            meshes.push(mesh);
        }
    }

    let (center, radius) = bounds(&scene, &meshes);
    Ok((scene, center, radius))
}

/// Rough bounding sphere of every mesh instance in `scene`
fn bounds(scene: &SceneGraph, meshes: &[MeshData]) -> (Vec3, f32) {
    let spheres: Vec<(Vec3, f32)> = scene
        .mesh_nodes()
        .into_iter()
        .filter_map(|(handle, world)| {
            let (center, radius) = meshes.get(handle.0)?.bounding_sphere();
            let center = world.transform_point(&Point3::from(center)).coords;
            Some((center, radius))
        })
        .collect();

    if spheres.is_empty() {
        return (Vec3::zeros(), 1.0);
    }

    #[allow(clippy::cast_precision_loss)]
    let center = spheres.iter().fold(Vec3::zeros(), |sum, (c, _)| sum + c) / spheres.len() as f32;
    let radius = spheres
        .iter()
        .map(|(c, r)| (c - center).norm() + r)
        .fold(0.0, f32::max);
    (center, radius.max(0.1))
}

fn run(args: &Args) -> Result<(), EngineError> {
    let config = match &args.config {
        Some(path) => ApplicationConfig::load_from_file(path)?,
        None => ApplicationConfig::default(),
    };
    logging::init(&config.engine.log_level);
    config.validate()?;

    let mut window = Window::new(&config.window)?;
    let mut renderer = VulkanRenderer::new(&window, &config.renderer)?;
    let mut input = InputState::new();
    let mut clock = FrameClock::new();

    let (scene, center, radius) = load_model(&mut renderer, &config.assets, args)?;
    renderer.submit_scene(&scene);

    let (width, height) = window.framebuffer_size();
    #[allow(clippy::cast_precision_loss)]
    let aspect = width as f32 / height.max(1) as f32;
    let mut camera = Camera::perspective(Vec3::new(0.0, 0.0, 5.0), 60.0, aspect, 0.05, radius * 20.0 + 100.0);
    let mut controller = CameraController::framing(center, radius);

    log::info!("Entering main loop");
    while !window.should_close() {
        input.begin_frame();
        for event in window.poll_events(&mut input) {
            match event {
                WindowEvent::Resized { width, height } => {
                    renderer.resize(width, height);
                    if width > 0 && height > 0 {
                        #[allow(clippy::cast_precision_loss)]
                        camera.set_aspect_ratio(width as f32 / height as f32);
                    }
                }
                WindowEvent::CloseRequested => window.set_should_close(true),
            }
        }

        if input.was_key_pressed(KeyCode::Escape) {
            window.set_should_close(true);
        }
        if input.was_key_pressed(KeyCode::Space) {
            controller = CameraController::framing(center, radius);
        }

        let (width, height) = window.framebuffer_size();
        if width == 0 || height == 0 {
            window.wait_events();
            clock.resume();
            continue;
        }

        let delta = clock.tick();
        controller.update(&input, delta);
        controller.apply(&mut camera);
        renderer.set_camera(&camera);
        renderer.draw_frame()?;
    }

    log::info!(
        "Exiting after {} frames ({:.1} fps average)",
        clock.frames(),
        clock.average_fps()
    );
    Ok(())
}

fn main() {
    let args = Args::parse(std::env::args().skip(1));
    if let Err(e) = run(&args) {
        logging::init("info");
        log::error!("{}", e);
        let mut source = std::error::Error::source(&e);
        while let Some(cause) = source {
            log::error!("  caused by: {}", cause);
            source = cause.source();
        }
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arguments_are_classified_by_extension() {
        let args = Args::parse(
            ["viewer.toml", "scene.GLB", "albedo.png"]
                .into_iter()
                .map(String::from),
        );
        assert_eq!(args.config, Some(PathBuf::from("viewer.toml")));
        assert_eq!(args.model, Some(PathBuf::from("scene.GLB")));
        assert_eq!(args.texture, Some(PathBuf::from("albedo.png")));
    }

    #[test]
    fn test_empty_scene_has_unit_bounds() {
        let (center, radius) = bounds(&SceneGraph::new(), &[]);
        assert_eq!(center, Vec3::zeros());
        assert_eq!(radius, 1.0);
    }
}
