use bytemuck::{Pod, Zeroable};

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex {
    const fn new(pos: [f32; 3], col: [f32; 3]) -> Self {
        Self { position: pos, color: col }
    }

    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: 12, // [f32; 3] is 12 bytes
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topology {
    Lines,
    Triangles,
}

impl Topology {
    pub fn primitive(&self) -> wgpu::PrimitiveTopology {
        match self {
            Topology::Lines => wgpu::PrimitiveTopology::LineList,
            Topology::Triangles => wgpu::PrimitiveTopology::TriangleList,
        }
    }
}

/// CPU-side geometry ready for upload.
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
    pub topology: Topology,
}

impl Geometry {
    pub fn positions(&self) -> impl Iterator<Item = glam::Vec3> + '_ {
        self.vertices.iter().map(|v| glam::Vec3::from_array(v.position))
    }
}

const RED: [f32; 3] = [1.0, 0.0, 0.0];
const GREEN: [f32; 3] = [0.0, 1.0, 0.0];
const BLUE: [f32; 3] = [0.0, 0.0, 1.0];
const WHITE: [f32; 3] = [1.0, 1.0, 1.0];

/// Three axis lines of length `size` from the origin, coloured X red, Y green,
/// Z blue.
pub fn create_triad_geometry(size: f32) -> Geometry {
    let vertices = vec![
        Vertex::new([0.0, 0.0, 0.0], RED),
        Vertex::new([size, 0.0, 0.0], RED),
        Vertex::new([0.0, 0.0, 0.0], GREEN),
        Vertex::new([0.0, size, 0.0], GREEN),
        Vertex::new([0.0, 0.0, 0.0], BLUE),
        Vertex::new([0.0, 0.0, size], BLUE),
    ];

    Geometry {
        vertices,
        indices: vec![0, 1, 2, 3, 4, 5],
        topology: Topology::Lines,
    }
}

/// Closed circle in the XY plane as a line loop, no centre vertex.
pub fn create_circle_geometry(radius: f32, segments: u16) -> Geometry {
    let segments = segments.max(3);
    let vertices = (0..segments)
        .map(|i| {
            let a = std::f32::consts::TAU * (i as f32) / (segments as f32);
            Vertex::new([radius * a.cos(), radius * a.sin(), 0.0], WHITE)
        })
        .collect();

    let indices = (0..segments).flat_map(|i| [i, (i + 1) % segments]).collect();

    Geometry {
        vertices,
        indices,
        topology: Topology::Lines,
    }
}

/// UV sphere centred at origin. Z is the polar axis.
pub fn create_sphere_geometry(radius: f32, lat_segments: u16, lon_segments: u16) -> Geometry {
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for lat in 0..=lat_segments {
        let theta = std::f32::consts::PI * (lat as f32) / (lat_segments as f32);
        let (sin_theta, cos_theta) = theta.sin_cos();

        for lon in 0..=lon_segments {
            let phi = std::f32::consts::TAU * (lon as f32) / (lon_segments as f32);
            let (sin_phi, cos_phi) = phi.sin_cos();

            let position = [
                radius * cos_phi * sin_theta,
                radius * sin_phi * sin_theta,
                radius * cos_theta,
            ];
            vertices.push(Vertex::new(position, WHITE));
        }
    }

    for lat in 0..lat_segments {
        for lon in 0..lon_segments {
            let first = lat * (lon_segments + 1) + lon;
            let second = first + lon_segments + 1;

            // Two triangles per quad
            indices.extend_from_slice(&[first, second, first + 1]);
            indices.extend_from_slice(&[second, second + 1, first + 1]);
        }
    }

    Geometry {
        vertices,
        indices,
        topology: Topology::Triangles,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triad_axes_colored() {
        let triad = create_triad_geometry(5.0);
        assert_eq!(triad.vertices[1].position, [5.0, 0.0, 0.0]);
        assert_eq!(triad.vertices[1].color, RED);
        assert_eq!(triad.vertices[3].color, GREEN);
        assert_eq!(triad.vertices[5].color, BLUE);
    }

    #[test]
    fn test_circle_closed_loop() {
        let circle = create_circle_geometry(2.0, 128);
        assert_eq!(circle.vertices.len(), 128);
        assert_eq!(circle.indices.len(), 256);
        assert_eq!(circle.indices[255], 0);
        assert!(circle.positions().all(|p| (p.length() - 2.0).abs() < 1e-5));
    }

    #[test]
    fn test_sphere_indices_in_range() {
        let sphere = create_sphere_geometry(1.0, 64, 128);
        let max = sphere.vertices.len() as u16;
        assert!(sphere.indices.iter().all(|&i| i < max));
        assert_eq!(sphere.indices.len() % 3, 0);
    }
}
