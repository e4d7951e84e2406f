//! Identity codecs: 7bit, 8bit and binary all copy bytes through
//! unchanged. The distinction lives in the Content-Transfer-Encoding
//! header, not in the byte transform.

use crate::modules::encoding::{Encoder, EncoderProperties};
use crate::modules::error::MailForgeResult;
use crate::modules::stream::{copy_stream, InputStream, OutputStream};

macro_rules! identity_encoder {
    ($type_name:ident, $name:literal) => {
        #[derive(Default)]
        pub struct $type_name {
            properties: EncoderProperties,
        }

        impl $type_name {
            pub fn construct() -> Box<dyn Encoder> {
                Box::new(Self::default())
            }
        }

        impl Encoder for $type_name {
            fn name(&self) -> &'static str {
                $name
            }

            fn properties(&self) -> &EncoderProperties {
                &self.properties
            }

            fn properties_mut(&mut self) -> &mut EncoderProperties {
                &mut self.properties
            }

            fn encode(
                &self,
                input: &mut dyn InputStream,
                output: &mut dyn OutputStream,
            ) -> MailForgeResult<usize> {
                copy_stream(input, output, None)
            }

            fn decode(
                &self,
                input: &mut dyn InputStream,
                output: &mut dyn OutputStream,
            ) -> MailForgeResult<usize> {
                copy_stream(input, output, None)
            }
        }
    };
}

identity_encoder!(SevenBitEncoder, "7bit");
identity_encoder!(EightBitEncoder, "8bit");
identity_encoder!(BinaryEncoder, "binary");
