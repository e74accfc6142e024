use pyo3::pymodule;

mod messages;
mod playback;

/// The Python module implemented in Rust.
#[pymodule]
mod soundboard_audio {
    use pyo3::prelude::*;

    #[pymodule_export]
    use super::playback::Soundboard;

    #[pymodule_export]
    use super::messages::AudioMessage;

    #[pymodule_init]
    fn init(m: &Bound<'_, PyModule>) -> PyResult<()> {
        use super::playback::exceptions::{
            DecodeError, PayloadMissingError, TransientDeviceError,
        };

        let py = m.py();
        m.add("DecodeError", py.get_type::<DecodeError>())?;
        m.add("PayloadMissingError", py.get_type::<PayloadMissingError>())?;
        m.add("TransientDeviceError", py.get_type::<TransientDeviceError>())?;
        Ok(())
    }
}
