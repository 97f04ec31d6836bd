/// `native/models.rs`: meshes, materials, models and IQM animation headers
///
/// Mesh attribute arrays are ledger blocks. A model owns its meshes and
/// materials once built; `unload_model` releases all of them.
use std::path::Path;

use super::{
    math,
    types::{
        Material, MaterialMap, Mesh, Model, ModelAnimation, RawBuffer, MATERIAL_MAP_DIFFUSE, MATERIAL_MAP_SPECULAR,
        MAX_MATERIAL_MAPS,
    },
    NativeLibrary,
};
use crate::marshal::values::{BoundingBox, Color, Vector3};

const IQM_MAGIC: &[u8; 16] = b"INTERQUAKEMODEL\0";
const IQM_VERSION: u32 = 2;
const IQM_HEADER_LEN: usize = 16 + 27 * 4;
const IQM_ANIM_LEN: usize = 20;

impl NativeLibrary {
    fn upload_mesh(&self, vertices: Vec<f32>, texcoords: Vec<f32>, normals: Vec<f32>, indices: Vec<u16>) -> Mesh {
        let vertex_count = (vertices.len() / 3) as i32;
        let triangle_count = (indices.len() / 3) as i32;
        let mut ledger = self.ledger();
        Mesh {
            vertex_count,
            triangle_count,
            vertices: ledger.insert(vertices),
            texcoords: ledger.insert(texcoords),
            normals: ledger.insert(normals),
            indices: ledger.insert(indices),
            vao_id: 0,
        }
    }

    pub fn gen_mesh_cube(&self, width: f32, height: f32, length: f32) -> Mesh {
        let (x, y, z) = (width / 2.0, height / 2.0, length / 2.0);
        // Per face: normal, then four corners counter-clockwise.
        let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
            ([0.0, 0.0, 1.0], [[-x, -y, z], [x, -y, z], [x, y, z], [-x, y, z]]),
            ([0.0, 0.0, -1.0], [[-x, -y, -z], [-x, y, -z], [x, y, -z], [x, -y, -z]]),
            ([0.0, 1.0, 0.0], [[-x, y, -z], [-x, y, z], [x, y, z], [x, y, -z]]),
            ([0.0, -1.0, 0.0], [[-x, -y, -z], [x, -y, -z], [x, -y, z], [-x, -y, z]]),
            ([1.0, 0.0, 0.0], [[x, -y, -z], [x, y, -z], [x, y, z], [x, -y, z]]),
            ([-1.0, 0.0, 0.0], [[-x, -y, -z], [-x, -y, z], [-x, y, z], [-x, y, -z]]),
        ];
        let uv = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

        let mut vertices = Vec::with_capacity(24 * 3);
        let mut texcoords = Vec::with_capacity(24 * 2);
        let mut normals = Vec::with_capacity(24 * 3);
        let mut indices = Vec::with_capacity(36);
        for (face, (normal, corners)) in faces.iter().enumerate() {
            for (corner, tc) in corners.iter().zip(uv) {
                vertices.extend_from_slice(corner);
                texcoords.extend_from_slice(&tc);
                normals.extend_from_slice(normal);
            }
            let base = (face * 4) as u16;
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        self.upload_mesh(vertices, texcoords, normals, indices)
    }

    /// Flat XZ grid centred on the origin, facing +Y.
    pub fn gen_mesh_plane(&self, width: f32, length: f32, res_x: i32, res_z: i32) -> Mesh {
        let res_x = res_x.max(1) as usize + 1;
        let res_z = res_z.max(1) as usize + 1;
        if res_x * res_z > u16::MAX as usize {
            log::warn!("MESH: Plane resolution {}x{} exceeds 16-bit indices", res_x - 1, res_z - 1);
            return Mesh::default();
        }

        let mut vertices = Vec::with_capacity(res_x * res_z * 3);
        let mut texcoords = Vec::with_capacity(res_x * res_z * 2);
        let mut normals = Vec::with_capacity(res_x * res_z * 3);
        for z in 0..res_z {
            let fz = z as f32 / (res_z - 1) as f32;
            for x in 0..res_x {
                let fx = x as f32 / (res_x - 1) as f32;
                vertices.extend_from_slice(&[(fx - 0.5) * width, 0.0, (fz - 0.5) * length]);
                texcoords.extend_from_slice(&[fx, fz]);
                normals.extend_from_slice(&[0.0, 1.0, 0.0]);
            }
        }

        let mut indices = Vec::with_capacity((res_x - 1) * (res_z - 1) * 6);
        for z in 0..res_z - 1 {
            for x in 0..res_x - 1 {
                let i = (z * res_x + x) as u16;
                let below = i + res_x as u16;
                indices.extend_from_slice(&[i, below + 1, i + 1, i, below, below + 1]);
            }
        }
        self.upload_mesh(vertices, texcoords, normals, indices)
    }

    pub fn get_mesh_bounding_box(&self, mesh: &Mesh) -> BoundingBox {
        self.ledger()
            .with(mesh.vertices as *const f32, |v| {
                let mut points = v.chunks_exact(3).map(|p| Vector3::new(p[0], p[1], p[2]));
                let first = points.next()?;
                Some(points.fold(BoundingBox { min: first, max: first }, |b, p| BoundingBox {
                    min: Vector3::new(b.min.x.min(p.x), b.min.y.min(p.y), b.min.z.min(p.z)),
                    max: Vector3::new(b.max.x.max(p.x), b.max.y.max(p.y), b.max.z.max(p.z)),
                }))
            })
            .flatten()
            .unwrap_or_default()
    }

    pub fn unload_mesh(&self, mesh: Mesh) {
        let mut ledger = self.ledger();
        ledger.take(mesh.vertices as *const f32);
        ledger.take(mesh.texcoords as *const f32);
        ledger.take(mesh.normals as *const f32);
        ledger.take(mesh.indices as *const u16);
        log::debug!("MESH: Unloaded mesh data ({} vertices)", mesh.vertex_count);
    }

    // ── Materials ─────────────────────────────────────────────────────────

    pub fn load_material_default(&self) -> Material {
        let mut maps = vec![MaterialMap::default(); MAX_MATERIAL_MAPS];
        maps[MATERIAL_MAP_DIFFUSE].color = Color::WHITE;
        maps[MATERIAL_MAP_SPECULAR].color = Color::WHITE;
        Material { shader_id: 0, maps: self.ledger().insert(maps), params: [0.0; 4] }
    }

    /// Releases the map array and every non-default texture it references.
    pub fn unload_material(&self, material: Material) {
        let maps = self.ledger().take(material.maps as *const MaterialMap).unwrap_or_default();
        for map in maps.iter().filter(|m| m.texture.id != 0) {
            self.unload_texture(map.texture);
        }
    }

    // ── Models ────────────────────────────────────────────────────────────

    /// Model with one mesh and the default material. The mesh moves into
    /// the model and is released with it.
    pub fn load_model_from_mesh(&self, mesh: Mesh) -> Model {
        let material = self.load_material_default();
        let mut ledger = self.ledger();
        Model {
            transform: math::matrix_identity(),
            mesh_count: 1,
            material_count: 1,
            meshes: ledger.insert(vec![mesh]),
            materials: ledger.insert(vec![material]),
            mesh_material: ledger.insert(vec![0i32]),
        }
    }

    /// Union of the mesh boxes, moved by the model transform.
    pub fn get_model_bounding_box(&self, model: &Model) -> BoundingBox {
        let meshes = self.ledger().with(model.meshes as *const Mesh, |m| m.to_vec()).unwrap_or_default();
        let mut boxes = meshes.iter().map(|m| self.get_mesh_bounding_box(m));
        let Some(first) = boxes.next() else {
            return BoundingBox::default();
        };
        let merged = boxes.fold(first, |a, b| BoundingBox {
            min: Vector3::new(a.min.x.min(b.min.x), a.min.y.min(b.min.y), a.min.z.min(b.min.z)),
            max: Vector3::new(a.max.x.max(b.max.x), a.max.y.max(b.max.y), a.max.z.max(b.max.z)),
        });
        let min = math::vector3_transform(merged.min, model.transform);
        let max = math::vector3_transform(merged.max, model.transform);
        BoundingBox {
            min: Vector3::new(min.x.min(max.x), min.y.min(max.y), min.z.min(max.z)),
            max: Vector3::new(min.x.max(max.x), min.y.max(max.y), min.z.max(max.z)),
        }
    }

    pub fn unload_model(&self, model: Model) {
        let (meshes, materials) = {
            let mut ledger = self.ledger();
            ledger.take(model.mesh_material as *const i32);
            (
                ledger.take(model.meshes as *const Mesh).unwrap_or_default(),
                ledger.take(model.materials as *const Material).unwrap_or_default(),
            )
        };
        for mesh in meshes {
            self.unload_mesh(mesh);
        }
        // Material textures are not owned by the model; only the map arrays go.
        let mut ledger = self.ledger();
        for material in materials {
            ledger.take(material.maps as *const MaterialMap);
        }
        log::info!("MODEL: Unloaded model (and meshes) from RAM and VRAM");
    }

    // ── Animations ────────────────────────────────────────────────────────

    /// Animation headers from an IQM file, in a library-owned array.
    pub fn load_model_animations(&self, file_name: &str) -> RawBuffer<ModelAnimation> {
        let path = Path::new(file_name);
        let is_iqm = path.extension().is_some_and(|e| e.eq_ignore_ascii_case("iqm"));
        if !is_iqm {
            log::warn!("MODEL: [{file_name}] Animation file format not supported");
            return RawBuffer::empty();
        }
        let parsed = std::fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| parse_iqm_animations(&bytes));
        match parsed {
            Ok(anims) => {
                log::info!("MODEL: [{file_name}] {} animations loaded", anims.len());
                let len = anims.len();
                RawBuffer { ptr: self.ledger().insert(anims), len }
            }
            Err(e) => {
                log::warn!("MODEL: [{file_name}] Failed to load animations: {e}");
                RawBuffer::empty()
            }
        }
    }

    pub fn unload_model_animations(&self, animations: RawBuffer<ModelAnimation>) {
        self.ledger().take(animations.ptr as *const ModelAnimation);
    }

    /// Animation headers carry no native buffers of their own.
    pub fn unload_model_animation(&self, animation: ModelAnimation) {
        log::debug!("MODEL: Unloaded animation \"{}\"", animation_name(&animation));
    }
}

pub fn animation_name(animation: &ModelAnimation) -> String {
    let end = animation.name.iter().position(|&b| b == 0).unwrap_or(animation.name.len());
    String::from_utf8_lossy(&animation.name[..end]).into_owned()
}

fn parse_iqm_animations(bytes: &[u8]) -> Result<Vec<ModelAnimation>, String> {
    if bytes.len() < IQM_HEADER_LEN || &bytes[..16] != IQM_MAGIC {
        return Err("not an IQM file".into());
    }
    let word = |offset: usize| -> Result<u32, String> {
        bytes
            .get(offset..offset + 4)
            .and_then(|b| b.try_into().ok())
            .map(u32::from_le_bytes)
            .ok_or_else(|| format!("truncated at byte {offset}"))
    };
    // Header fields after the magic, in file order.
    let field = |index: usize| word(16 + index * 4);

    let version = field(0)?;
    if version != IQM_VERSION {
        return Err(format!("unsupported IQM version {version}"));
    }
    let ofs_text = field(4)? as usize;
    let num_poses = field(15)? as i32;
    let num_anims = field(17)? as usize;
    let ofs_anims = field(18)? as usize;

    (0..num_anims)
        .map(|i| {
            let base = ofs_anims + i * IQM_ANIM_LEN;
            let name_ofs = ofs_text + word(base)? as usize;
            let frame_count = word(base + 8)? as i32;

            let mut name = [0u8; 32];
            let text = bytes.get(name_ofs..).unwrap_or_default();
            let len = text.iter().position(|&b| b == 0).unwrap_or(text.len()).min(31);
            name[..len].copy_from_slice(&text[..len]);

            Ok(ModelAnimation { bone_count: num_poses, frame_count, name })
        })
        .collect()
}
