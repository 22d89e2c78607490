use thiserror::Error;

/// Everything that can go wrong outside of the rasterization core, which only has preconditions.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("obj parse error: {0}")]
    Obj(#[from] obj::ObjError),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("configuration error: {0}")]
    Config(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("face {face} has {corners} corners, the model is supposed to be triangulated")]
    NotTriangulated { face: usize, corners: usize },
    #[error("face {face} refers to a vertex attribute that does not exist")]
    BadIndex { face: usize },
    #[error("unknown shader '{0}', expected one of: random, default, phong, mapped")]
    UnknownShader(String),
    #[cfg(feature = "window")]
    #[error("window error: {0}")]
    Window(String),
}

impl From<figment::Error> for RenderError {
    fn from(err: figment::Error) -> Self {
        return RenderError::Config(Box::new(err));
    }
}
